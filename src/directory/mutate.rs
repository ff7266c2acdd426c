//! Mutation Engine: atomic, invariant-preserving transformations of the
//! [`NodeStore`].
//!
//! Every operation validates all preconditions before touching a node, so a
//! failed call never leaves a partial effect. Callers serialize access; see
//! [`crate::drive::Drive`] for the lock scope.

use crate::directory::node::{Node, NodeKind, StorageRef};
use crate::directory::store::NodeStore;
use crate::error::DriveError;
use crate::types::{NodeId, ShareToken};
use tracing::{debug, info};

fn validate_name(name: &str) -> Result<(), DriveError> {
    if name.is_empty() {
        return Err(DriveError::InvalidOperation(
            "name must not be empty".to_string(),
        ));
    }
    if name.contains('/') {
        return Err(DriveError::InvalidOperation(format!(
            "name must not contain '/': {}",
            name
        )));
    }
    Ok(())
}

impl NodeStore {
    /// Create a folder under `parent_path`, returning the new folder's path.
    ///
    /// Fails `Conflict` if a non-trashed sibling folder with the same name
    /// already exists under the resolved parent.
    pub fn new_folder(&mut self, parent_path: &str, name: &str) -> Result<String, DriveError> {
        validate_name(name)?;
        let parent_id = self.resolve(parent_path)?;
        let parent = self
            .get(&parent_id)
            .ok_or_else(|| DriveError::not_found(parent_path))?;
        if !parent.is_folder() {
            return Err(DriveError::InvalidOperation(format!(
                "parent is not a folder: {}",
                parent_path
            )));
        }
        if self.has_live_folder_named(&parent_id, name) {
            return Err(DriveError::Conflict(format!(
                "folder '{}' already exists under {}",
                name, parent_path
            )));
        }

        let folder = Node::new_folder(name, Some(parent_id));
        let id = self.insert(folder);
        let path = self.path_of(&id);
        info!(path = %path, id = %id, "Created folder");
        Ok(path)
    }

    /// Register a file whose bytes are already durable in remote storage.
    ///
    /// Invoked by the external Uploader on upload completion. File name
    /// collisions among siblings are allowed: uploads append, never overwrite.
    pub fn new_file(
        &mut self,
        parent_path: &str,
        name: &str,
        storage_ref: StorageRef,
        size_bytes: u64,
        duration_seconds: u64,
    ) -> Result<Node, DriveError> {
        validate_name(name)?;
        let parent_id = self.resolve(parent_path)?;
        let parent = self
            .get(&parent_id)
            .ok_or_else(|| DriveError::not_found(parent_path))?;
        if !parent.is_folder() {
            return Err(DriveError::InvalidOperation(format!(
                "parent is not a folder: {}",
                parent_path
            )));
        }

        let file = Node::new_file(name, parent_id, storage_ref, size_bytes, duration_seconds);
        let registered = file.clone();
        let id = self.insert(file);
        info!(
            path = %self.path_of(&id),
            size_bytes,
            duration_seconds,
            "Registered file"
        );
        Ok(registered)
    }

    /// Rename a file or folder in place.
    ///
    /// Folder renames fail `Conflict` against a non-trashed sibling folder
    /// with the new name; file names are not required to be unique.
    pub fn rename_file_folder(&mut self, path: &str, new_name: &str) -> Result<(), DriveError> {
        validate_name(new_name)?;
        let id = self.resolve(path)?;
        if id == *self.root_id() {
            return Err(DriveError::InvalidOperation(
                "cannot rename the root folder".to_string(),
            ));
        }
        let node = self.get(&id).ok_or_else(|| DriveError::not_found(path))?;
        if let (true, Some(parent_id)) = (node.is_folder(), node.parent.clone()) {
            if let Some(existing) = self.live_child_by_name(&parent_id, new_name) {
                if existing.is_folder() && existing.id != id {
                    return Err(DriveError::Conflict(format!(
                        "folder '{}' already exists under {}",
                        new_name,
                        self.path_of(&parent_id)
                    )));
                }
            }
        }
        let node = self.get_mut(&id).ok_or_else(|| DriveError::not_found(path))?;
        let old_name = std::mem::replace(&mut node.name, new_name.to_string());
        info!(path = %self.path_of(&id), old_name = %old_name, "Renamed node");
        Ok(())
    }

    /// Toggle the trash flag on the resolved node only.
    ///
    /// Descendants are shadowed implicitly; clearing the flag un-hides the
    /// whole subtree. Restoring a folder whose name now collides with a live
    /// sibling folder fails `Conflict` to preserve name uniqueness.
    pub fn trash_file_folder(&mut self, path: &str, trashed: bool) -> Result<(), DriveError> {
        // Trashing targets the live node; restore targets the trashed one,
        // so a live namesake never shadows a trash-view entry.
        let id = if trashed {
            self.resolve_any(path)?
        } else {
            self.resolve_trashed(path)?
        };
        if id == *self.root_id() {
            return Err(DriveError::InvalidOperation(
                "cannot trash the root folder".to_string(),
            ));
        }
        if !trashed {
            let node = self.get(&id).ok_or_else(|| DriveError::not_found(path))?;
            if let (true, Some(parent_id)) = (node.is_folder(), node.parent.clone()) {
                let name = node.name.clone();
                if let Some(existing) = self.live_child_by_name(&parent_id, &name) {
                    if existing.is_folder() && existing.id != id {
                        return Err(DriveError::Conflict(format!(
                            "a live folder named '{}' already exists under {}",
                            name,
                            self.path_of(&parent_id)
                        )));
                    }
                }
            }
        }
        let node = self.get_mut(&id).ok_or_else(|| DriveError::not_found(path))?;
        node.trashed = trashed;
        info!(path = %self.path_of(&id), trashed, "Toggled trash flag");
        Ok(())
    }

    /// Permanently remove a node and, for folders, its entire subtree.
    ///
    /// Irreversible. Remote bytes are untouched; reclaiming storage refs is
    /// the caller's concern. Share tokens of deleted folders are dropped.
    pub fn delete_file_folder(&mut self, path: &str) -> Result<(), DriveError> {
        let id = self.resolve_trashed(path)?;
        if id == *self.root_id() {
            return Err(DriveError::InvalidOperation(
                "cannot delete the root folder".to_string(),
            ));
        }
        let subtree = self.collect_subtree(&id);
        self.detach_from_parent(&id);
        let removed = subtree.len();
        self.remove_nodes(&subtree);
        info!(path = %path, removed, "Deleted subtree");
        Ok(())
    }

    /// Re-parent a node under a new folder. Constant-time edge update, no
    /// recursive copy.
    pub fn move_file_folder(
        &mut self,
        source_path: &str,
        destination_path: &str,
    ) -> Result<(), DriveError> {
        let (source, destination) = self.check_move_copy(source_path, destination_path)?;
        self.attach_to_parent(&source, &destination);
        info!(
            source = %source_path,
            destination = %self.path_of(&source),
            "Moved node"
        );
        Ok(())
    }

    /// Deep-clone the source subtree under the destination folder.
    ///
    /// Every cloned node gets a freshly minted id; file clones share the
    /// source's `storage_ref` (metadata duplication only). Share tokens are
    /// not carried over, since a token must resolve to exactly one folder.
    pub fn copy_file_folder(
        &mut self,
        source_path: &str,
        destination_path: &str,
    ) -> Result<(), DriveError> {
        let (source, destination) = self.check_move_copy(source_path, destination_path)?;
        let clone_root = self
            .clone_subtree(&source, &destination)
            .ok_or_else(|| DriveError::not_found(source_path))?;
        info!(
            source = %source_path,
            destination = %self.path_of(&clone_root),
            "Copied subtree"
        );
        Ok(())
    }

    /// Return the folder's share token, minting one on first request.
    ///
    /// Idempotent: a folder never loses its token once issued.
    pub fn get_folder_auth(&mut self, path: &str) -> Result<ShareToken, DriveError> {
        let id = self.resolve(path)?;
        let node = self.get(&id).ok_or_else(|| DriveError::not_found(path))?;
        if !node.is_folder() {
            return Err(DriveError::InvalidOperation(format!(
                "share tokens apply to folders only: {}",
                path
            )));
        }
        if let Some(token) = node.share_token() {
            debug!(path = %path, "Returning existing share token");
            return Ok(token.clone());
        }

        let mut token = ShareToken::generate();
        while self.folder_for_token(&token).is_some() {
            token = ShareToken::generate();
        }
        if let Some(NodeKind::Folder { share_token, .. }) =
            self.get_mut(&id).map(|n| &mut n.kind)
        {
            *share_token = Some(token.clone());
        }
        self.register_token(token.clone(), id.clone());
        info!(path = %path, "Issued share token");
        Ok(token)
    }

    /// Shared validation for move/copy: resolves both paths, rejects
    /// self-containment, non-folder destinations, root sources, and
    /// destination name collisions. No mutation happens here.
    fn check_move_copy(
        &self,
        source_path: &str,
        destination_path: &str,
    ) -> Result<(NodeId, NodeId), DriveError> {
        let source = self.resolve(source_path)?;
        let destination = self.resolve(destination_path)?;
        if source == *self.root_id() {
            return Err(DriveError::InvalidOperation(
                "cannot move or copy the root folder".to_string(),
            ));
        }
        let dest_node = self
            .get(&destination)
            .ok_or_else(|| DriveError::not_found(destination_path))?;
        if !dest_node.is_folder() {
            return Err(DriveError::InvalidOperation(format!(
                "destination is not a folder: {}",
                destination_path
            )));
        }
        if self.is_same_or_descendant(&destination, &source) {
            return Err(DriveError::InvalidOperation(format!(
                "destination {} is inside the source subtree {}",
                destination_path, source_path
            )));
        }
        let source_name = &self
            .get(&source)
            .ok_or_else(|| DriveError::not_found(source_path))?
            .name;
        if self.has_live_child_named(&destination, source_name) {
            return Err(DriveError::Conflict(format!(
                "'{}' already exists under {}",
                source_name, destination_path
            )));
        }
        Ok((source, destination))
    }

    /// Recursively clone `src` (and descendants) under `new_parent`,
    /// returning the clone's id. `None` only if `src` is not in the arena.
    fn clone_subtree(&mut self, src: &NodeId, new_parent: &NodeId) -> Option<NodeId> {
        let original = self.get(src).cloned()?;
        let cloned_kind = match &original.kind {
            NodeKind::Folder { .. } => NodeKind::Folder {
                children: Vec::new(),
                share_token: None,
            },
            NodeKind::File {
                storage_ref,
                size_bytes,
                duration_seconds,
            } => NodeKind::File {
                storage_ref: storage_ref.clone(),
                size_bytes: *size_bytes,
                duration_seconds: *duration_seconds,
            },
        };
        let clone = Node {
            id: NodeId::generate(),
            name: original.name.clone(),
            parent: Some(new_parent.clone()),
            created_at: original.created_at,
            trashed: original.trashed,
            kind: cloned_kind,
        };
        let clone_id = self.insert(clone);
        for child in original.children().iter() {
            self.clone_subtree(child, &clone_id);
        }
        Some(clone_id)
    }
}
