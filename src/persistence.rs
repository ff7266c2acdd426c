//! Persistence Gateway: snapshot serialization and the periodic backup task.
//!
//! The gateway is the sole bridge between the in-memory [`NodeStore`] and the
//! durable medium. The snapshot format is a self-describing JSON document
//! carrying every node attribute (trash flags and share tokens included) so
//! the tree can be reconstructed structurally identical.
//!
//! A failed backup is logged and retried on the next scheduled tick; a failed
//! load falls back to an empty root-only store rather than refusing to start.

use crate::directory::node::Node;
use crate::directory::store::NodeStore;
use crate::error::DriveError;
use crate::types::NodeId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Complete point-in-time serialization of the node store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub root: NodeId,
    pub nodes: Vec<Node>,
}

impl Snapshot {
    /// Take a consistent copy of the store. Cheap relative to the write that
    /// follows; callers hold the store lock only for this step.
    pub fn capture(store: &NodeStore) -> Self {
        Snapshot {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            root: store.root_id().clone(),
            nodes: store.iter().cloned().collect(),
        }
    }

    /// Reconstruct a store from this snapshot.
    pub fn restore(self) -> Result<NodeStore, DriveError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(DriveError::Persistence(format!(
                "unsupported snapshot version {}",
                self.version
            )));
        }
        NodeStore::from_parts(self.root, self.nodes)
    }
}

/// Durable medium port. The production implementation ships snapshots to the
/// remote storage channel via the client pool; the filesystem implementation
/// below covers local deployments and tests.
#[async_trait]
pub trait SnapshotBackend: Send + Sync {
    /// Persist raw snapshot bytes, replacing any previous snapshot.
    async fn write(&self, bytes: &[u8]) -> Result<(), DriveError>;

    /// Read the last persisted snapshot, `None` if none exists yet.
    async fn read(&self) -> Result<Option<Vec<u8>>, DriveError>;
}

/// Snapshot storage on the local filesystem.
///
/// Writes go through a temp file and rename so a crash mid-write never
/// corrupts the previous snapshot.
pub struct FsSnapshotBackend {
    path: PathBuf,
}

impl FsSnapshotBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FsSnapshotBackend { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl SnapshotBackend for FsSnapshotBackend {
    async fn write(&self, bytes: &[u8]) -> Result<(), DriveError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                DriveError::Persistence(format!(
                    "failed to create snapshot directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await.map_err(|e| {
            DriveError::Persistence(format!(
                "failed to write snapshot to {}: {}",
                tmp.display(),
                e
            ))
        })?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            DriveError::Persistence(format!(
                "failed to publish snapshot at {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    async fn read(&self) -> Result<Option<Vec<u8>>, DriveError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DriveError::Persistence(format!(
                "failed to read snapshot from {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

/// Bridge between the node store and the snapshot backend.
pub struct PersistenceGateway {
    backend: Arc<dyn SnapshotBackend>,
}

impl PersistenceGateway {
    pub fn new(backend: Arc<dyn SnapshotBackend>) -> Self {
        PersistenceGateway { backend }
    }

    /// Reconstruct the node store from the last durable snapshot.
    ///
    /// Runs once at startup, before any request is served. On any failure the
    /// engine starts with an empty root-only store; losing unreached history
    /// is preferred over refusing to start.
    pub async fn load(&self) -> NodeStore {
        let bytes = match self.backend.read().await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                info!("No snapshot found, starting with an empty drive");
                return NodeStore::new();
            }
            Err(e) => {
                error!(error = %e, "Snapshot read failed, starting with an empty drive");
                return NodeStore::new();
            }
        };

        let snapshot: Snapshot = match serde_json::from_slice(&bytes) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "Snapshot parse failed, starting with an empty drive");
                return NodeStore::new();
            }
        };
        let saved_at = snapshot.saved_at;
        match snapshot.restore() {
            Ok(store) => {
                info!(
                    nodes = store.len(),
                    saved_at = %saved_at,
                    "Restored drive from snapshot"
                );
                store
            }
            Err(e) => {
                error!(error = %e, "Snapshot restore failed, starting with an empty drive");
                NodeStore::new()
            }
        }
    }

    /// Serialize a captured snapshot and write it to the durable medium.
    ///
    /// Callers capture the snapshot under the store lock and invoke this
    /// outside it, so the write never blocks mutations.
    pub async fn backup(&self, snapshot: Snapshot) -> Result<(), DriveError> {
        let node_count = snapshot.nodes.len();
        let bytes = serde_json::to_vec(&snapshot)
            .map_err(|e| DriveError::Persistence(format!("failed to serialize snapshot: {}", e)))?;
        self.backend.write(&bytes).await?;
        debug!(nodes = node_count, bytes = bytes.len(), "Snapshot written");
        Ok(())
    }
}

/// Log-and-continue wrapper used by the scheduled backup loop.
pub(crate) async fn run_backup_tick(gateway: &PersistenceGateway, snapshot: Snapshot) {
    if let Err(e) = gateway.backup(snapshot).await {
        warn!(error = %e, "Scheduled backup failed, will retry on next tick");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::node::StorageRef;
    use tempfile::TempDir;

    fn populated_store() -> NodeStore {
        let mut store = NodeStore::new();
        store.new_folder("/", "Movies").unwrap();
        store
            .new_file("/Movies", "a.mp4", StorageRef::from(7), 1000, 120)
            .unwrap();
        store.get_folder_auth("/Movies").unwrap();
        store.trash_file_folder("/Movies/a.mp4", true).unwrap();
        store
    }

    #[tokio::test]
    async fn round_trip_preserves_structure() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(FsSnapshotBackend::new(dir.path().join("snapshot.json")));
        let gateway = PersistenceGateway::new(backend);

        let store = populated_store();
        let token = store
            .get(&store.resolve("/Movies").unwrap())
            .unwrap()
            .share_token()
            .cloned()
            .unwrap();

        gateway.backup(Snapshot::capture(&store)).await.unwrap();
        let restored = gateway.load().await;

        assert_eq!(restored.len(), store.len());
        let movies = restored.resolve("/Movies").unwrap();
        assert_eq!(restored.path_of(&movies), "/Movies");
        assert_eq!(restored.folder_for_token(&token), Some(&movies));
        // Trash flags survive: the file is hidden from live resolution.
        assert!(restored.resolve("/Movies/a.mp4").is_err());
        assert_eq!(restored.resolve_any("/Movies/a.mp4").unwrap(),
            store.resolve_any("/Movies/a.mp4").unwrap());
        restored.check_invariants().unwrap();
    }

    #[tokio::test]
    async fn load_without_snapshot_starts_empty() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(FsSnapshotBackend::new(dir.path().join("missing.json")));
        let gateway = PersistenceGateway::new(backend);
        let store = gateway.load().await;
        assert_eq!(store.len(), 1);
        assert_eq!(store.path_of(store.root_id()), "/");
    }

    #[tokio::test]
    async fn corrupt_snapshot_falls_back_to_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(&path, b"not json").unwrap();
        let gateway = PersistenceGateway::new(Arc::new(FsSnapshotBackend::new(path)));
        let store = gateway.load().await;
        assert_eq!(store.len(), 1);
    }
}
