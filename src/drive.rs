//! Drive facade: the process-wide handle to the directory engine.
//!
//! Wraps the [`NodeStore`] behind a single exclusive lock and pairs it with
//! the [`PersistenceGateway`]. Request handlers and the background backup
//! task share clones of this handle.
//!
//! Lock discipline: mutations take the write lock, queries the read lock, and
//! the backup tick takes the read lock only long enough to capture a
//! consistent copy — the durable write happens outside any lock. None of the
//! locked sections perform I/O or suspend.

use crate::directory::node::{Node, StorageRef};
use crate::directory::query::{DirectoryListing, EntryView, FileInfo, FolderTreeNode, SortSpec};
use crate::directory::store::NodeStore;
use crate::error::DriveError;
use crate::persistence::{run_backup_tick, PersistenceGateway, Snapshot};
use crate::types::ShareToken;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Shared handle to the virtual directory engine.
#[derive(Clone)]
pub struct Drive {
    store: Arc<RwLock<NodeStore>>,
    gateway: Arc<PersistenceGateway>,
}

impl Drive {
    /// Load the last snapshot (or start empty) and wrap the store.
    pub async fn open(gateway: PersistenceGateway) -> Self {
        let store = gateway.load().await;
        Drive {
            store: Arc::new(RwLock::new(store)),
            gateway: Arc::new(gateway),
        }
    }

    /// Wrap an existing store; used by tests and embedders.
    pub fn with_store(store: NodeStore, gateway: PersistenceGateway) -> Self {
        Drive {
            store: Arc::new(RwLock::new(store)),
            gateway: Arc::new(gateway),
        }
    }

    // Mutation operations. Serialized by the write lock; each validates all
    // invariants before touching a node, so no partial effect is observable.

    pub fn new_folder(&self, parent_path: &str, name: &str) -> Result<String, DriveError> {
        self.store.write().new_folder(parent_path, name)
    }

    pub fn new_file(
        &self,
        parent_path: &str,
        name: &str,
        storage_ref: StorageRef,
        size_bytes: u64,
        duration_seconds: u64,
    ) -> Result<Node, DriveError> {
        self.store
            .write()
            .new_file(parent_path, name, storage_ref, size_bytes, duration_seconds)
    }

    pub fn rename_file_folder(&self, path: &str, new_name: &str) -> Result<(), DriveError> {
        self.store.write().rename_file_folder(path, new_name)
    }

    pub fn trash_file_folder(&self, path: &str, trashed: bool) -> Result<(), DriveError> {
        self.store.write().trash_file_folder(path, trashed)
    }

    pub fn delete_file_folder(&self, path: &str) -> Result<(), DriveError> {
        self.store.write().delete_file_folder(path)
    }

    pub fn move_file_folder(
        &self,
        source_path: &str,
        destination_path: &str,
    ) -> Result<(), DriveError> {
        self.store
            .write()
            .move_file_folder(source_path, destination_path)
    }

    pub fn copy_file_folder(
        &self,
        source_path: &str,
        destination_path: &str,
    ) -> Result<(), DriveError> {
        self.store
            .write()
            .copy_file_folder(source_path, destination_path)
    }

    pub fn get_folder_auth(&self, path: &str) -> Result<ShareToken, DriveError> {
        // Lazily mints a token, so this is a write even though callers treat
        // it as a lookup.
        self.store.write().get_folder_auth(path)
    }

    // Query operations. Concurrent readers; never observe a half-applied
    // mutation.

    pub fn get_directory(
        &self,
        path: &str,
        is_admin: bool,
        auth: Option<&ShareToken>,
        sort: SortSpec,
    ) -> Result<(DirectoryListing, Option<String>), DriveError> {
        self.store.read().get_directory(path, is_admin, auth, sort)
    }

    pub fn get_file(&self, path: &str) -> Result<FileInfo, DriveError> {
        self.store.read().get_file(path)
    }

    pub fn get_trashed_files_folders(&self, sort: SortSpec) -> Vec<EntryView> {
        self.store.read().get_trashed_files_folders(sort)
    }

    pub fn search_file_folder(&self, query: &str, sort: SortSpec) -> Vec<EntryView> {
        self.store.read().search_file_folder(query, sort)
    }

    pub fn get_folder_tree(&self) -> FolderTreeNode {
        self.store.read().get_folder_tree()
    }

    // Persistence.

    /// Capture a consistent snapshot and write it to the durable medium.
    pub async fn backup(&self) -> Result<(), DriveError> {
        let snapshot = {
            let store = self.store.read();
            Snapshot::capture(&store)
        };
        self.gateway.backup(snapshot).await
    }

    /// Spawn the periodic backup task. A failed tick is logged and retried on
    /// the next interval; it never crashes the process. Abort the returned
    /// handle to stop the task.
    pub fn spawn_backup_task(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let gateway = Arc::clone(&self.gateway);
        info!(interval_secs = interval.as_secs(), "Starting backup task");
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; skip it so a fresh process
            // does not overwrite a good snapshot with an empty store before
            // handlers have run.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let snapshot = {
                    let store = store.read();
                    Snapshot::capture(&store)
                };
                run_backup_tick(&gateway, snapshot).await;
            }
        })
    }
}
