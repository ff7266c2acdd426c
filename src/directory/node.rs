//! Node model for the virtual directory tree.
//!
//! A node is either a folder or a file. Parent/child edges are stored as id
//! references into the arena owned by [`NodeStore`](super::store::NodeStore),
//! never as nested owned structures.

use crate::types::{NodeId, ShareToken};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque locator into the external storage channel (e.g. a remote message
/// identifier). The engine stores and returns this value, never dereferences it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageRef(String);

impl StorageRef {
    pub fn new(raw: impl Into<String>) -> Self {
        StorageRef(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for StorageRef {
    fn from(message_id: i64) -> Self {
        StorageRef(message_id.to_string())
    }
}

/// Variant-specific node payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NodeKind {
    Folder {
        /// Child ids, insertion order. Ordering for display is applied at
        /// query time, never stored.
        children: Vec<NodeId>,
        /// Read-only capability for this subtree, minted lazily and never
        /// revoked once issued.
        share_token: Option<ShareToken>,
    },
    File {
        storage_ref: StorageRef,
        size_bytes: u64,
        /// Playback length for media files, 0 when not applicable.
        duration_seconds: u64,
    },
}

/// A single folder or file in the directory tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    /// Display name, unique among non-trashed siblings (folders only for
    /// rename; files may collide by design).
    pub name: String,
    /// Ownership edge; `None` only for the synthetic root folder.
    pub parent: Option<NodeId>,
    pub created_at: DateTime<Utc>,
    /// Soft-delete flag on this node only. Descendants are shadowed
    /// implicitly; see `NodeStore::is_effectively_trashed`.
    pub trashed: bool,
    pub kind: NodeKind,
}

impl Node {
    /// Create a folder node with no children.
    pub fn new_folder(name: impl Into<String>, parent: Option<NodeId>) -> Self {
        Node {
            id: NodeId::generate(),
            name: name.into(),
            parent,
            created_at: Utc::now(),
            trashed: false,
            kind: NodeKind::Folder {
                children: Vec::new(),
                share_token: None,
            },
        }
    }

    /// Create a file node referencing already-durable remote bytes.
    pub fn new_file(
        name: impl Into<String>,
        parent: NodeId,
        storage_ref: StorageRef,
        size_bytes: u64,
        duration_seconds: u64,
    ) -> Self {
        Node {
            id: NodeId::generate(),
            name: name.into(),
            parent: Some(parent),
            created_at: Utc::now(),
            trashed: false,
            kind: NodeKind::File {
                storage_ref,
                size_bytes,
                duration_seconds,
            },
        }
    }

    pub fn is_folder(&self) -> bool {
        matches!(self.kind, NodeKind::Folder { .. })
    }

    pub fn is_file(&self) -> bool {
        matches!(self.kind, NodeKind::File { .. })
    }

    /// File size in bytes, 0 for folders.
    pub fn size_bytes(&self) -> u64 {
        match &self.kind {
            NodeKind::File { size_bytes, .. } => *size_bytes,
            NodeKind::Folder { .. } => 0,
        }
    }

    /// Child ids for folders, empty slice for files.
    pub fn children(&self) -> &[NodeId] {
        match &self.kind {
            NodeKind::Folder { children, .. } => children,
            NodeKind::File { .. } => &[],
        }
    }

    pub fn share_token(&self) -> Option<&ShareToken> {
        match &self.kind {
            NodeKind::Folder { share_token, .. } => share_token.as_ref(),
            NodeKind::File { .. } => None,
        }
    }
}

/// Coarse media category inferred from a file name at query time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Video,
    Audio,
    Image,
    Document,
    Archive,
    Other,
}

impl FileCategory {
    /// Infer a category from the file extension. Never stored on the node.
    pub fn from_name(name: &str) -> Self {
        let ext = name
            .rsplit_once('.')
            .map(|(_, e)| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "mp4" | "mkv" | "webm" | "avi" | "mov" | "flv" | "m4v" | "ts" => FileCategory::Video,
            "mp3" | "flac" | "ogg" | "wav" | "m4a" | "aac" | "opus" => FileCategory::Audio,
            "jpg" | "jpeg" | "png" | "gif" | "webp" | "bmp" | "svg" | "heic" => FileCategory::Image,
            "pdf" | "doc" | "docx" | "txt" | "md" | "epub" | "xls" | "xlsx" | "ppt" | "pptx" => {
                FileCategory::Document
            }
            "zip" | "rar" | "7z" | "tar" | "gz" | "xz" | "bz2" => FileCategory::Archive,
            _ => FileCategory::Other,
        }
    }
}
