//! End-to-end scenarios through the `Drive` facade.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use vdrive::directory::{EntryKind, SortKey, SortOrder, SortSpec};
use vdrive::{Drive, DriveError, FsSnapshotBackend, NodeStore, PersistenceGateway, StorageRef};

fn drive_in(dir: &TempDir) -> Drive {
    let backend = Arc::new(FsSnapshotBackend::new(dir.path().join("snapshot.json")));
    Drive::with_store(NodeStore::new(), PersistenceGateway::new(backend))
}

fn by_name() -> SortSpec {
    SortSpec {
        key: SortKey::Name,
        order: SortOrder::Asc,
    }
}

#[tokio::test]
async fn upload_then_list_shows_the_file() {
    let dir = TempDir::new().unwrap();
    let drive = drive_in(&dir);

    drive.new_folder("/", "Movies").unwrap();
    drive
        .new_file("/Movies", "a.mp4", StorageRef::from(7), 1000, 120)
        .unwrap();

    let (listing, share_root) = drive
        .get_directory("/Movies", true, None, SortSpec::default())
        .unwrap();
    assert!(share_root.is_none());
    assert_eq!(listing.path, "/Movies");
    assert_eq!(listing.entries.len(), 1);
    let entry = &listing.entries[0];
    assert_eq!(entry.name, "a.mp4");
    assert_eq!(entry.kind, EntryKind::File);
    assert_eq!(entry.size_bytes, 1000);
    assert_eq!(entry.duration_seconds, 120);
    assert_eq!(entry.path, "/Movies/a.mp4");
}

#[tokio::test]
async fn share_token_is_stable_and_gates_access() {
    let dir = TempDir::new().unwrap();
    let drive = drive_in(&dir);
    drive.new_folder("/", "Movies").unwrap();

    let first = drive.get_folder_auth("/Movies").unwrap();
    let second = drive.get_folder_auth("/Movies").unwrap();
    assert_eq!(first, second);

    let (listing, share_root) = drive
        .get_directory("/Movies", false, Some(&first), by_name())
        .unwrap();
    assert_eq!(listing.path, "/Movies");
    assert_eq!(share_root.as_deref(), Some("/Movies"));

    assert!(matches!(
        drive.get_directory("/Movies", false, None, by_name()),
        Err(DriveError::Unauthorized(_))
    ));
    drive.new_folder("/", "Other").unwrap();
    let other = drive.get_folder_auth("/Other").unwrap();
    assert!(matches!(
        drive.get_directory("/Movies", false, Some(&other), by_name()),
        Err(DriveError::Unauthorized(_))
    ));
}

#[tokio::test]
async fn trash_restore_and_permanent_delete() {
    let dir = TempDir::new().unwrap();
    let drive = drive_in(&dir);
    drive.new_folder("/", "Movies").unwrap();
    drive
        .new_file("/Movies", "a.mp4", StorageRef::from(1), 10, 0)
        .unwrap();
    drive
        .new_file("/Movies", "b.mp4", StorageRef::from(2), 20, 0)
        .unwrap();

    drive.trash_file_folder("/Movies", true).unwrap();
    let trashed = drive.get_trashed_files_folders(by_name());
    let names: Vec<&str> = trashed.iter().map(|e| e.name.as_str()).collect();
    // The whole subtree shows up even though only the folder was flagged.
    assert_eq!(names, vec!["Movies", "a.mp4", "b.mp4"]);
    assert!(drive.get_file("/Movies/a.mp4").is_err());

    drive.trash_file_folder("/Movies", false).unwrap();
    assert!(drive.get_trashed_files_folders(by_name()).is_empty());
    assert_eq!(drive.get_file("/Movies/a.mp4").unwrap().size_bytes, 10);

    drive.trash_file_folder("/Movies/a.mp4", true).unwrap();
    drive.delete_file_folder("/Movies/a.mp4").unwrap();
    assert!(drive.get_trashed_files_folders(by_name()).is_empty());
    assert!(matches!(
        drive.delete_file_folder("/Movies/a.mp4"),
        Err(DriveError::NotFound(_))
    ));
}

#[tokio::test]
async fn emptying_trash_spares_a_live_namesake() {
    let dir = TempDir::new().unwrap();
    let drive = drive_in(&dir);
    drive.new_folder("/", "docs").unwrap();
    drive
        .new_file("/docs", "keep.pdf", StorageRef::from(3), 30, 0)
        .unwrap();
    drive.trash_file_folder("/docs", true).unwrap();
    drive.new_folder("/", "docs").unwrap();
    drive
        .new_file("/docs", "fresh.pdf", StorageRef::from(4), 40, 0)
        .unwrap();

    // Restore is blocked by the live folder, delete still reaches the
    // trashed one.
    assert!(matches!(
        drive.trash_file_folder("/docs", false),
        Err(DriveError::Conflict(_))
    ));
    drive.delete_file_folder("/docs").unwrap();
    assert!(drive.get_trashed_files_folders(by_name()).is_empty());
    assert_eq!(drive.get_file("/docs/fresh.pdf").unwrap().size_bytes, 40);
}

#[tokio::test]
async fn move_and_copy_across_folders() {
    let dir = TempDir::new().unwrap();
    let drive = drive_in(&dir);
    drive.new_folder("/", "src").unwrap();
    drive.new_folder("/src", "inner").unwrap();
    drive
        .new_file("/src/inner", "clip.mkv", StorageRef::from(42), 512, 30)
        .unwrap();
    drive.new_folder("/", "dst").unwrap();

    assert!(matches!(
        drive.move_file_folder("/src", "/src/inner"),
        Err(DriveError::InvalidOperation(_))
    ));

    drive.copy_file_folder("/src", "/dst").unwrap();
    drive.delete_file_folder("/src").unwrap();

    let copied = drive.get_file("/dst/src/inner/clip.mkv").unwrap();
    assert_eq!(copied.storage_ref, StorageRef::from(42));
    assert_eq!(copied.size_bytes, 512);

    drive.move_file_folder("/dst/src", "/").unwrap();
    assert!(drive.get_file("/src/inner/clip.mkv").is_ok());

    let tree = drive.get_folder_tree();
    let top: Vec<&str> = tree.children.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(top, vec!["dst", "src"]);
}

#[tokio::test]
async fn search_finds_live_nodes_only() {
    let dir = TempDir::new().unwrap();
    let drive = drive_in(&dir);
    drive.new_folder("/", "Music").unwrap();
    drive
        .new_file("/Music", "Song.FLAC", StorageRef::from(5), 99, 200)
        .unwrap();
    drive
        .new_file("/Music", "other.mp3", StorageRef::from(6), 11, 100)
        .unwrap();

    let hits = drive.search_file_folder("song", by_name());
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].path, "/Music/Song.FLAC");

    drive.trash_file_folder("/Music/Song.FLAC", true).unwrap();
    assert!(drive.search_file_folder("song", by_name()).is_empty());
}

#[tokio::test]
async fn scheduled_backup_persists_without_blocking_mutations() {
    let dir = TempDir::new().unwrap();
    let drive = drive_in(&dir);
    drive.new_folder("/", "steady").unwrap();

    let handle = drive.spawn_backup_task(Duration::from_millis(20));
    for i in 0..10 {
        drive
            .new_file("/steady", &format!("f{}.bin", i), StorageRef::from(i), 1, 0)
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.abort();

    let backend = Arc::new(FsSnapshotBackend::new(dir.path().join("snapshot.json")));
    let reopened = Drive::open(PersistenceGateway::new(backend)).await;
    let (listing, _) = reopened
        .get_directory("/steady", true, None, by_name())
        .unwrap();
    // At least one tick ran after all ten files were committed.
    assert_eq!(listing.entries.len(), 10);
}
