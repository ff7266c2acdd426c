//! vdrive: Virtual Directory Engine
//!
//! In-memory hierarchical namespace for a personal cloud drive whose file
//! bytes live as messages in a remote storage channel. The engine owns the
//! folder/file tree, its mutation and query operations, soft-delete,
//! capability-scoped sharing, and the periodic snapshot that makes the
//! namespace durable. Byte transport (upload, streaming, transcoding) is
//! handled by external collaborators that only call in here to commit or
//! look up metadata.

pub mod config;
pub mod directory;
pub mod drive;
pub mod error;
pub mod logging;
pub mod persistence;
pub mod types;

pub use directory::{NodeStore, SortKey, SortOrder, SortSpec, StorageRef};
pub use drive::Drive;
pub use error::DriveError;
pub use persistence::{FsSnapshotBackend, PersistenceGateway, Snapshot, SnapshotBackend};
pub use types::{NodeId, ShareToken};
