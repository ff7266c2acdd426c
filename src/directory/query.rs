//! Query Engine: read-only views over the [`NodeStore`].
//!
//! Listing, search, trash view, folder-tree export, and share-authorization
//! lookup. Results are detached view types so callers never hold references
//! into the store across the lock scope.

use crate::directory::node::{FileCategory, Node, NodeKind, StorageRef};
use crate::directory::store::NodeStore;
use crate::error::DriveError;
use crate::types::{NodeId, ShareToken};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Sort key shared by all listing endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    Name,
    Date,
    Size,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Caller-specified ordering for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub key: SortKey,
    pub order: SortOrder,
}

impl Default for SortSpec {
    /// Matches the web layer's defaults: newest first.
    fn default() -> Self {
        SortSpec {
            key: SortKey::Date,
            order: SortOrder::Desc,
        }
    }
}

/// Entry kind exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Folder,
    File,
}

/// Detached, display-ready view of a single node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryView {
    pub id: NodeId,
    pub name: String,
    pub kind: EntryKind,
    /// Derived at query time; must not be cached across mutations.
    pub path: String,
    pub size_bytes: u64,
    pub duration_seconds: u64,
    pub created_at: DateTime<Utc>,
    /// Inferred from the file name; `None` for folders.
    pub category: Option<FileCategory>,
}

impl EntryView {
    fn from_node(store: &NodeStore, node: &Node) -> Self {
        let (kind, duration_seconds, category) = match &node.kind {
            NodeKind::Folder { .. } => (EntryKind::Folder, 0, None),
            NodeKind::File {
                duration_seconds, ..
            } => (
                EntryKind::File,
                *duration_seconds,
                Some(FileCategory::from_name(&node.name)),
            ),
        };
        EntryView {
            id: node.id.clone(),
            name: node.name.clone(),
            kind,
            path: store.path_of(&node.id),
            size_bytes: node.size_bytes(),
            duration_seconds,
            created_at: node.created_at,
            category,
        }
    }
}

/// A folder plus its visible (non-trashed) contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryListing {
    pub id: NodeId,
    pub name: String,
    pub path: String,
    pub entries: Vec<EntryView>,
}

/// Nested live-folder hierarchy for folder pickers. Files excluded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderTreeNode {
    pub id: NodeId,
    pub name: String,
    pub path: String,
    pub children: Vec<FolderTreeNode>,
}

/// What the external Streamer/Downloader needs to serve bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub id: NodeId,
    pub name: String,
    pub path: String,
    pub storage_ref: StorageRef,
    pub size_bytes: u64,
}

impl NodeStore {
    /// Resolve and list a folder.
    ///
    /// Admin callers see any live path. Non-admin callers must present a
    /// token matching some ancestor folder's share token; the returned path
    /// is that share root, so navigation can be fenced to its subtree.
    pub fn get_directory(
        &self,
        path: &str,
        is_admin: bool,
        auth: Option<&ShareToken>,
        sort: SortSpec,
    ) -> Result<(DirectoryListing, Option<String>), DriveError> {
        let id = self.resolve(path)?;
        let node = self.get(&id).ok_or_else(|| DriveError::not_found(path))?;
        if !node.is_folder() {
            return Err(DriveError::InvalidOperation(format!(
                "not a folder: {}",
                path
            )));
        }

        let share_root = if is_admin {
            None
        } else {
            let token = auth.ok_or_else(|| {
                DriveError::Unauthorized("share token required".to_string())
            })?;
            Some(self.authorize_share(&id, token)?)
        };

        let mut entries: Vec<EntryView> = node
            .children()
            .iter()
            .filter_map(|cid| self.get(cid))
            .filter(|child| !child.trashed)
            .map(|child| EntryView::from_node(self, child))
            .collect();
        sort_entries(&mut entries, sort);

        debug!(path = %path, entries = entries.len(), is_admin, "Listed directory");
        Ok((
            DirectoryListing {
                id: id.clone(),
                name: node.name.clone(),
                path: self.path_of(&id),
                entries,
            },
            share_root,
        ))
    }

    /// Lookup a file's storage reference for the Streamer/Downloader.
    pub fn get_file(&self, path: &str) -> Result<FileInfo, DriveError> {
        let id = self.resolve(path)?;
        let node = self.get(&id).ok_or_else(|| DriveError::not_found(path))?;
        match &node.kind {
            NodeKind::File {
                storage_ref,
                size_bytes,
                ..
            } => Ok(FileInfo {
                id: id.clone(),
                name: node.name.clone(),
                path: self.path_of(&id),
                storage_ref: storage_ref.clone(),
                size_bytes: *size_bytes,
            }),
            NodeKind::Folder { .. } => Err(DriveError::InvalidOperation(format!(
                "not a file: {}",
                path
            ))),
        }
    }

    /// Every effectively trashed node (self or ancestor flagged), flattened.
    pub fn get_trashed_files_folders(&self, sort: SortSpec) -> Vec<EntryView> {
        let mut entries: Vec<EntryView> = self
            .iter()
            .filter(|node| node.parent.is_some() && self.is_effectively_trashed(&node.id))
            .map(|node| EntryView::from_node(self, node))
            .collect();
        sort_entries(&mut entries, sort);
        entries
    }

    /// Case-insensitive substring match against node names across the entire
    /// live namespace.
    pub fn search_file_folder(&self, query: &str, sort: SortSpec) -> Vec<EntryView> {
        let needle = query.to_lowercase();
        let mut entries: Vec<EntryView> = self
            .iter()
            .filter(|node| node.parent.is_some())
            .filter(|node| !self.is_effectively_trashed(&node.id))
            .filter(|node| node.name.to_lowercase().contains(&needle))
            .map(|node| EntryView::from_node(self, node))
            .collect();
        sort_entries(&mut entries, sort);
        debug!(query = %query, hits = entries.len(), "Searched namespace");
        entries
    }

    /// Export the full live folder hierarchy as a nested structure.
    pub fn get_folder_tree(&self) -> FolderTreeNode {
        self.folder_tree_from(self.root_id())
    }

    fn folder_tree_from(&self, id: &NodeId) -> FolderTreeNode {
        let node = self.get(id);
        let (name, child_ids) = match node {
            Some(n) => (n.name.clone(), n.children().to_vec()),
            None => (String::new(), Vec::new()),
        };
        let mut children: Vec<FolderTreeNode> = child_ids
            .iter()
            .filter_map(|cid| self.get(cid))
            .filter(|child| child.is_folder() && !child.trashed)
            .map(|child| self.folder_tree_from(&child.id))
            .collect();
        // Folder pickers always list by name; the caller-facing SortSpec
        // applies to directory listings only.
        children.sort_by(|a, b| name_sort_key(&a.name).cmp(&name_sort_key(&b.name)));
        FolderTreeNode {
            id: id.clone(),
            name,
            path: self.path_of(id),
            children,
        }
    }

    /// Walk the ancestor chain looking for a folder whose share token matches.
    /// Returns the share-root path on success.
    fn authorize_share(&self, id: &NodeId, token: &ShareToken) -> Result<String, DriveError> {
        let mut current = Some(id.clone());
        while let Some(cur) = current {
            let node = match self.get(&cur) {
                Some(n) => n,
                None => break,
            };
            if node.share_token() == Some(token) {
                return Ok(self.path_of(&cur));
            }
            current = node.parent.clone();
        }
        Err(DriveError::Unauthorized(
            "share token does not cover this path".to_string(),
        ))
    }
}

/// Shared sort policy: folders first, then files, each internally ordered by
/// the caller's key and direction. Name comparison is case-insensitive.
fn sort_entries(entries: &mut [EntryView], sort: SortSpec) {
    entries.sort_by(|a, b| {
        let group = group_rank(a).cmp(&group_rank(b));
        if group != std::cmp::Ordering::Equal {
            return group;
        }
        let ordering = match sort.key {
            SortKey::Name => name_sort_key(&a.name).cmp(&name_sort_key(&b.name)),
            SortKey::Date => a.created_at.cmp(&b.created_at),
            SortKey::Size => a.size_bytes.cmp(&b.size_bytes),
        };
        match sort.order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
}

/// Single definition of name ordering: case-insensitive, shared by listings
/// and the folder tree.
fn name_sort_key(name: &str) -> String {
    name.to_lowercase()
}

fn group_rank(entry: &EntryView) -> u8 {
    match entry.kind {
        EntryKind::Folder => 0,
        EntryKind::File => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_store() -> NodeStore {
        let mut store = NodeStore::new();
        store.new_folder("/", "Movies").unwrap();
        store.new_folder("/", "Audio").unwrap();
        store
            .new_file("/Movies", "b.mp4", StorageRef::from(2), 2000, 60)
            .unwrap();
        store
            .new_file("/Movies", "a.mp4", StorageRef::from(1), 1000, 120)
            .unwrap();
        store
    }

    fn by_name() -> SortSpec {
        SortSpec {
            key: SortKey::Name,
            order: SortOrder::Asc,
        }
    }

    #[test]
    fn listing_excludes_trashed_and_sorts_folders_first() {
        let mut store = seeded_store();
        store
            .new_file("/", "z.zip", StorageRef::from(3), 50, 0)
            .unwrap();
        store.trash_file_folder("/Audio", true).unwrap();

        let (listing, share_root) = store.get_directory("/", true, None, by_name()).unwrap();
        assert!(share_root.is_none());
        let names: Vec<&str> = listing.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Movies", "z.zip"]);
        assert_eq!(listing.entries[1].category, Some(FileCategory::Archive));
    }

    #[test]
    fn size_sort_orders_files_within_group() {
        let store = seeded_store();
        let spec = SortSpec {
            key: SortKey::Size,
            order: SortOrder::Desc,
        };
        let (listing, _) = store.get_directory("/Movies", true, None, spec).unwrap();
        let sizes: Vec<u64> = listing.entries.iter().map(|e| e.size_bytes).collect();
        assert_eq!(sizes, vec![2000, 1000]);
    }

    #[test]
    fn get_file_returns_storage_ref_for_streamer() {
        let store = seeded_store();
        let info = store.get_file("/Movies/a.mp4").unwrap();
        assert_eq!(info.storage_ref, StorageRef::from(1));
        assert_eq!(info.size_bytes, 1000);
        assert!(matches!(
            store.get_file("/Movies"),
            Err(DriveError::InvalidOperation(_))
        ));
    }

    #[test]
    fn trash_view_flattens_whole_shadowed_subtree() {
        let mut store = seeded_store();
        store.trash_file_folder("/Movies", true).unwrap();
        let trashed = store.get_trashed_files_folders(by_name());
        let names: Vec<&str> = trashed.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Movies", "a.mp4", "b.mp4"]);
    }

    #[test]
    fn search_is_case_insensitive_and_skips_trash() {
        let mut store = seeded_store();
        let hits = store.search_file_folder("MP4", by_name());
        assert_eq!(hits.len(), 2);

        store.trash_file_folder("/Movies", true).unwrap();
        assert!(store.search_file_folder("mp4", by_name()).is_empty());
    }

    #[test]
    fn folder_tree_excludes_files_and_trashed_folders() {
        let mut store = seeded_store();
        store.new_folder("/Movies", "Classics").unwrap();
        store.new_folder("/", "archive").unwrap();
        store.trash_file_folder("/Audio", true).unwrap();

        let tree = store.get_folder_tree();
        assert_eq!(tree.path, "/");
        let top: Vec<&str> = tree.children.iter().map(|c| c.name.as_str()).collect();
        // Case-insensitive name order, same policy as listings.
        assert_eq!(top, vec!["archive", "Movies"]);
        assert_eq!(tree.children[1].children[0].name, "Classics");
        assert_eq!(tree.children[1].children[0].path, "/Movies/Classics");
    }

    #[test]
    fn share_auth_covers_subtree_and_rejects_strangers() {
        let mut store = seeded_store();
        let token = store.get_folder_auth("/Movies").unwrap();

        let (_, share_root) = store
            .get_directory("/Movies", false, Some(&token), by_name())
            .unwrap();
        assert_eq!(share_root.as_deref(), Some("/Movies"));

        assert!(matches!(
            store.get_directory("/Movies", false, None, by_name()),
            Err(DriveError::Unauthorized(_))
        ));
        let wrong = ShareToken::generate();
        assert!(matches!(
            store.get_directory("/Movies", false, Some(&wrong), by_name()),
            Err(DriveError::Unauthorized(_))
        ));
        // A token on an ancestor authorizes nested paths too.
        store.new_folder("/Movies", "Classics").unwrap();
        let (_, root) = store
            .get_directory("/Movies/Classics", false, Some(&token), by_name())
            .unwrap();
        assert_eq!(root.as_deref(), Some("/Movies"));
    }
}
