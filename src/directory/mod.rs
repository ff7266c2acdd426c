//! Virtual directory engine: node model, arena store, mutation and query
//! operations.

pub mod mutate;
pub mod node;
pub mod query;
pub mod store;

pub use node::{FileCategory, Node, NodeKind, StorageRef};
pub use query::{
    DirectoryListing, EntryKind, EntryView, FileInfo, FolderTreeNode, SortKey, SortOrder, SortSpec,
};
pub use store::NodeStore;
