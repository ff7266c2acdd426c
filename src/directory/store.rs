//! NodeStore: arena-backed storage for the directory tree.
//!
//! Owns every folder/file node, the root id, and the share-token side table.
//! All structural invariants (single-rooted acyclic tree, resolvable parent
//! edges, process-unique share tokens) are maintained here and in the
//! mutation operations layered on top.
//!
//! Path resolution is a pure function of the store's current state; logical
//! paths are derived from parent edges and never stored on nodes.

use crate::directory::node::{Node, NodeKind};
use crate::error::DriveError;
use crate::types::{NodeId, ShareToken};
use std::collections::HashMap;

/// Arena of directory nodes indexed by id.
#[derive(Debug)]
pub struct NodeStore {
    nodes: HashMap<NodeId, Node>,
    root: NodeId,
    /// token -> folder id; rebuilt from nodes on snapshot load.
    share_index: HashMap<ShareToken, NodeId>,
}

impl NodeStore {
    /// Create a store containing only the synthetic root folder.
    pub fn new() -> Self {
        let root = Node::new_folder("", None);
        let root_id = root.id.clone();
        let mut nodes = HashMap::new();
        nodes.insert(root_id.clone(), root);
        NodeStore {
            nodes,
            root: root_id,
            share_index: HashMap::new(),
        }
    }

    /// Rebuild a store from a flat node list, e.g. a loaded snapshot.
    ///
    /// The share index is reconstructed from folder tokens. Fails if the node
    /// set does not contain `root` or a token maps to two folders.
    pub fn from_parts(root: NodeId, nodes: Vec<Node>) -> Result<Self, DriveError> {
        let mut map = HashMap::with_capacity(nodes.len());
        let mut share_index = HashMap::new();
        for node in nodes {
            if let Some(token) = node.share_token() {
                if share_index.insert(token.clone(), node.id.clone()).is_some() {
                    return Err(DriveError::Persistence(format!(
                        "share token resolves to more than one folder: {}",
                        token
                    )));
                }
            }
            map.insert(node.id.clone(), node);
        }
        if !map.contains_key(&root) {
            return Err(DriveError::Persistence(
                "snapshot root id missing from node set".to_string(),
            ));
        }
        Ok(NodeStore {
            nodes: map,
            root,
            share_index,
        })
    }

    pub fn root_id(&self) -> &NodeId {
        &self.root
    }

    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Resolve a `/`-delimited logical path to a node id.
    ///
    /// Walks from the root following exact, case-sensitive name lookup among
    /// non-trashed children. Fails `NotFound` if any segment is missing or an
    /// intermediate segment names a file.
    pub fn resolve(&self, path: &str) -> Result<NodeId, DriveError> {
        let mut current = self.root.clone();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let node = self
                .nodes
                .get(&current)
                .ok_or_else(|| DriveError::not_found(path))?;
            if !node.is_folder() {
                return Err(DriveError::not_found(path));
            }
            current = self
                .live_child_by_name(&node.id, segment)
                .map(|child| child.id.clone())
                .ok_or_else(|| DriveError::not_found(path))?;
        }
        Ok(current)
    }

    /// Resolve a path including trashed nodes, preferring a live child over a
    /// trashed namesake. Used when moving a node into the trash: the live
    /// node is the one the caller sees.
    pub fn resolve_any(&self, path: &str) -> Result<NodeId, DriveError> {
        let mut current = self.root.clone();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let node = self
                .nodes
                .get(&current)
                .ok_or_else(|| DriveError::not_found(path))?;
            if !node.is_folder() {
                return Err(DriveError::not_found(path));
            }
            let children: Vec<&Node> = node
                .children()
                .iter()
                .filter_map(|cid| self.nodes.get(cid))
                .filter(|child| child.name == segment)
                .collect();
            let next = children
                .iter()
                .find(|c| !c.trashed)
                .or_else(|| children.first())
                .ok_or_else(|| DriveError::not_found(path))?;
            current = next.id.clone();
        }
        Ok(current)
    }

    /// Resolve a path for restore and permanent delete, preferring a trashed
    /// child over a live namesake at every step.
    ///
    /// Trash-view entries carry the paths of trashed nodes, and a live
    /// namesake may legitimately exist next to a trashed one; without the
    /// bias those entries would be unreachable. Backtracks into the live
    /// branch when the trashed candidate does not contain the rest of the
    /// path.
    pub fn resolve_trashed(&self, path: &str) -> Result<NodeId, DriveError> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        self.resolve_trashed_from(&self.root, &segments)
            .ok_or_else(|| DriveError::not_found(path))
    }

    fn resolve_trashed_from(&self, current: &NodeId, segments: &[&str]) -> Option<NodeId> {
        let (segment, rest) = match segments.split_first() {
            Some(pair) => pair,
            None => return Some(current.clone()),
        };
        let node = self.nodes.get(current)?;
        let mut candidates: Vec<&Node> = node
            .children()
            .iter()
            .filter_map(|cid| self.nodes.get(cid))
            .filter(|child| child.name == *segment)
            .collect();
        // `false` sorts first, so trashed candidates are tried before live ones.
        candidates.sort_by_key(|c| !c.trashed);
        candidates
            .iter()
            .find_map(|c| self.resolve_trashed_from(&c.id, rest))
    }

    /// Derive the logical path of a node by walking parent edges up to the root.
    pub fn path_of(&self, id: &NodeId) -> String {
        let mut segments = Vec::new();
        let mut current = Some(id.clone());
        while let Some(cur) = current {
            match self.nodes.get(&cur) {
                Some(node) => {
                    if node.parent.is_some() {
                        segments.push(node.name.clone());
                    }
                    current = node.parent.clone();
                }
                None => break,
            }
        }
        if segments.is_empty() {
            return "/".to_string();
        }
        segments.reverse();
        format!("/{}", segments.join("/"))
    }

    /// A node is effectively trashed if it or any ancestor carries the flag.
    pub fn is_effectively_trashed(&self, id: &NodeId) -> bool {
        let mut current = Some(id.clone());
        while let Some(cur) = current {
            match self.nodes.get(&cur) {
                Some(node) => {
                    if node.trashed {
                        return true;
                    }
                    current = node.parent.clone();
                }
                None => return false,
            }
        }
        false
    }

    /// True if `id` equals `ancestor` or lies anywhere inside its subtree.
    pub fn is_same_or_descendant(&self, id: &NodeId, ancestor: &NodeId) -> bool {
        let mut current = Some(id.clone());
        while let Some(cur) = current {
            if cur == *ancestor {
                return true;
            }
            current = self.nodes.get(&cur).and_then(|n| n.parent.clone());
        }
        false
    }

    /// Non-trashed child of `folder` with exactly the given name, if any.
    pub fn live_child_by_name(&self, folder: &NodeId, name: &str) -> Option<&Node> {
        let parent = self.nodes.get(folder)?;
        parent
            .children()
            .iter()
            .filter_map(|cid| self.nodes.get(cid))
            .find(|child| !child.trashed && child.name == name)
    }

    /// True if `folder` has a non-trashed child folder with the given name.
    pub fn has_live_folder_named(&self, folder: &NodeId, name: &str) -> bool {
        self.nodes
            .get(folder)
            .map(|parent| {
                parent
                    .children()
                    .iter()
                    .filter_map(|cid| self.nodes.get(cid))
                    .any(|child| !child.trashed && child.is_folder() && child.name == name)
            })
            .unwrap_or(false)
    }

    /// True if `folder` has any non-trashed child with the given name.
    pub fn has_live_child_named(&self, folder: &NodeId, name: &str) -> bool {
        self.live_child_by_name(folder, name).is_some()
    }

    /// Insert a node and register its parent edge. The parent must exist and
    /// be a folder; callers validate this before constructing the node.
    pub(crate) fn insert(&mut self, node: Node) -> NodeId {
        let id = node.id.clone();
        if let Some(parent_id) = node.parent.clone() {
            if let Some(NodeKind::Folder { children, .. }) =
                self.nodes.get_mut(&parent_id).map(|n| &mut n.kind)
            {
                children.push(id.clone());
            }
        }
        self.nodes.insert(id.clone(), node);
        id
    }

    /// Remove the child edge from a node's current parent. The node keeps its
    /// `parent` field until re-attached or removed.
    pub(crate) fn detach_from_parent(&mut self, id: &NodeId) {
        let parent_id = match self.nodes.get(id).and_then(|n| n.parent.clone()) {
            Some(p) => p,
            None => return,
        };
        if let Some(NodeKind::Folder { children, .. }) =
            self.nodes.get_mut(&parent_id).map(|n| &mut n.kind)
        {
            children.retain(|cid| cid != id);
        }
    }

    /// Re-parent a node under a new folder. Constant-time edge update.
    pub(crate) fn attach_to_parent(&mut self, id: &NodeId, new_parent: &NodeId) {
        self.detach_from_parent(id);
        if let Some(NodeKind::Folder { children, .. }) =
            self.nodes.get_mut(new_parent).map(|n| &mut n.kind)
        {
            children.push(id.clone());
        }
        if let Some(node) = self.nodes.get_mut(id) {
            node.parent = Some(new_parent.clone());
        }
    }

    /// Collect a node and all its descendants, depth-first.
    pub fn collect_subtree(&self, id: &NodeId) -> Vec<NodeId> {
        let mut collected = Vec::new();
        let mut stack = vec![id.clone()];
        while let Some(cur) = stack.pop() {
            if let Some(node) = self.nodes.get(&cur) {
                stack.extend(node.children().iter().cloned());
            }
            collected.push(cur);
        }
        collected
    }

    /// Physically remove a set of nodes, dropping their share tokens.
    pub(crate) fn remove_nodes(&mut self, ids: &[NodeId]) {
        for id in ids {
            if let Some(node) = self.nodes.remove(id) {
                if let Some(token) = node.share_token() {
                    self.share_index.remove(token);
                }
            }
        }
    }

    pub fn folder_for_token(&self, token: &ShareToken) -> Option<&NodeId> {
        self.share_index.get(token)
    }

    pub(crate) fn register_token(&mut self, token: ShareToken, folder: NodeId) {
        self.share_index.insert(token, folder);
    }

    /// Structural invariant check used by the fuzz tests.
    ///
    /// Verifies parent/child edge symmetry, acyclicity, non-trashed sibling
    /// name uniqueness (same-kind for folders, any-kind handled by mutation
    /// preconditions), and share-index consistency.
    #[doc(hidden)]
    pub fn check_invariants(&self) -> Result<(), String> {
        // Root exists and has no parent.
        let root = self
            .nodes
            .get(&self.root)
            .ok_or_else(|| "root missing from arena".to_string())?;
        if root.parent.is_some() {
            return Err("root has a parent".to_string());
        }

        for node in self.nodes.values() {
            // Every non-root node has a parent edge resolving to a folder
            // that lists it as a child.
            match &node.parent {
                Some(parent_id) => {
                    let parent = self
                        .nodes
                        .get(parent_id)
                        .ok_or_else(|| format!("dangling parent for {}", node.id))?;
                    if !parent.is_folder() {
                        return Err(format!("parent of {} is not a folder", node.id));
                    }
                    if !parent.children().contains(&node.id) {
                        return Err(format!("parent of {} does not list it", node.id));
                    }
                }
                None => {
                    if node.id != self.root {
                        return Err(format!("non-root node {} has no parent", node.id));
                    }
                }
            }

            // Acyclicity: walking up must terminate at the root.
            let mut seen = 0usize;
            let mut cur = node.parent.clone();
            while let Some(p) = cur {
                seen += 1;
                if seen > self.nodes.len() {
                    return Err(format!("cycle above {}", node.id));
                }
                cur = self.nodes.get(&p).and_then(|n| n.parent.clone());
            }

            // Non-trashed sibling folders never collide by name.
            if node.is_folder() {
                let mut names = std::collections::HashSet::new();
                for child in node
                    .children()
                    .iter()
                    .filter_map(|cid| self.nodes.get(cid))
                    .filter(|c| !c.trashed && c.is_folder())
                {
                    if !names.insert(child.name.as_str()) {
                        return Err(format!(
                            "duplicate live folder name '{}' under {}",
                            child.name, node.id
                        ));
                    }
                }
            }
        }

        for (token, folder_id) in &self.share_index {
            match self.nodes.get(folder_id) {
                Some(folder) if folder.share_token() == Some(token) => {}
                _ => return Err(format!("share index entry for {} is stale", folder_id)),
            }
        }
        Ok(())
    }
}

impl Default for NodeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::node::StorageRef;

    #[test]
    fn new_store_resolves_root() {
        let store = NodeStore::new();
        let id = store.resolve("/").unwrap();
        assert_eq!(&id, store.root_id());
        assert_eq!(store.path_of(&id), "/");
    }

    #[test]
    fn resolve_walks_live_children_only() {
        let mut store = NodeStore::new();
        let root = store.root_id().clone();
        let folder = store.insert(Node::new_folder("Movies", Some(root.clone())));
        let file = Node::new_file("a.mp4", folder.clone(), StorageRef::from(7), 1000, 120);
        let file_id = store.insert(file);

        assert_eq!(store.resolve("/Movies").unwrap(), folder);
        assert_eq!(store.resolve("/Movies/a.mp4").unwrap(), file_id);
        assert_eq!(store.path_of(&file_id), "/Movies/a.mp4");

        store.get_mut(&folder).unwrap().trashed = true;
        assert!(store.resolve("/Movies").is_err());
        // Shadowed by the trashed ancestor, even though its own flag is clear.
        assert!(store.is_effectively_trashed(&file_id));
    }

    #[test]
    fn resolve_rejects_file_as_intermediate_segment() {
        let mut store = NodeStore::new();
        let root = store.root_id().clone();
        let file_id = store.insert(Node::new_file(
            "a.mp4",
            root,
            StorageRef::from(1),
            10,
            0,
        ));
        assert!(store.resolve("/a.mp4/deeper").is_err());
        assert_eq!(store.resolve("/a.mp4").unwrap(), file_id);
    }

    #[test]
    fn trash_resolution_prefers_trashed_namesakes_and_backtracks() {
        let mut store = NodeStore::new();
        let root = store.root_id().clone();
        let old = store.insert(Node::new_folder("docs", Some(root.clone())));
        store.get_mut(&old).unwrap().trashed = true;
        let new = store.insert(Node::new_folder("docs", Some(root)));
        let inner = store.insert(Node::new_folder("inner", Some(new.clone())));

        // Live resolution sees only the new folder.
        assert_eq!(store.resolve("/docs").unwrap(), new);
        assert_eq!(store.resolve_any("/docs").unwrap(), new);
        // Trash resolution reaches the shadowed one.
        assert_eq!(store.resolve_trashed("/docs").unwrap(), old);
        // The trashed branch misses "inner", so the walk falls back to the
        // live namesake.
        assert_eq!(store.resolve_trashed("/docs/inner").unwrap(), inner);
        assert!(store.resolve_trashed("/docs/absent").is_err());
    }

    #[test]
    fn subtree_collection_and_descendant_checks() {
        let mut store = NodeStore::new();
        let root = store.root_id().clone();
        let a = store.insert(Node::new_folder("a", Some(root.clone())));
        let b = store.insert(Node::new_folder("b", Some(a.clone())));
        let c = store.insert(Node::new_folder("c", Some(b.clone())));

        assert!(store.is_same_or_descendant(&c, &a));
        assert!(store.is_same_or_descendant(&a, &a));
        assert!(!store.is_same_or_descendant(&a, &c));

        let subtree = store.collect_subtree(&a);
        assert_eq!(subtree.len(), 3);
        store.check_invariants().unwrap();
    }
}
