//! Integration tests for the on-disk local index

mod common;

use std::sync::Arc;

use ::common::grid::{Grid, MemoryGrid};
use magic_folder_daemon::database::{DatabaseError, SCHEMA_VERSION};
use magic_folder_daemon::{Database, DuplicatePolicy, Folder};

#[tokio::test]
async fn test_capture_survives_reopen() {
    let folder = common::TestFolder::new();
    let author = common::setup_author("alice");
    folder.write("docs/a.txt", b"first");

    let identifier = {
        let db = Database::connect(folder.db_path()).await.unwrap();
        let grid: Arc<dyn Grid> = Arc::new(MemoryGrid::new());
        let options = common::options(&folder, author.clone(), DuplicatePolicy::Queue, 2);
        let (magic, _jobs) = Folder::new(options, db.clone(), grid).unwrap();
        let snapshot = magic.submit_snapshot("docs/a.txt").await.unwrap();
        db.close().await;
        snapshot.identifier
    };

    let db = Database::connect(folder.db_path()).await.unwrap();
    let stored = db
        .get_local_snapshot("docs/a.txt", &author)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.identifier, identifier);
    assert_eq!(stored.name, "docs/a.txt");
    assert_eq!(stored.read_content().await.unwrap().as_ref(), b"first");
}

#[tokio::test]
async fn test_paths_are_stored_encoded() {
    let folder = common::TestFolder::new();
    let author = common::setup_author("alice");
    let (magic, _jobs) =
        common::setup_folder(&folder, author, &MemoryGrid::new(), DuplicatePolicy::Queue).await;

    folder.write("deep/nested/file.txt", b"x");
    magic.submit_snapshot("deep/nested/file.txt").await.unwrap();

    let paths = magic.database().list_local_paths().await.unwrap();
    let encoded = ::common::magic_path::path2magic("deep/nested/file.txt");
    assert!(paths.contains(&encoded));
    assert!(!encoded.contains('/'));
}

#[tokio::test]
async fn test_open_rejects_other_schema_version() {
    let folder = common::TestFolder::new();

    let db = Database::connect(folder.db_path()).await.unwrap();
    assert_eq!(db.schema_version().await.unwrap(), SCHEMA_VERSION);
    sqlx::query("UPDATE version SET version = ?1")
        .bind(SCHEMA_VERSION + 1)
        .execute(&*db)
        .await
        .unwrap();
    db.close().await;

    let err = Database::connect(folder.db_path()).await.unwrap_err();
    match err {
        DatabaseError::UnsupportedSchema { found, supported } => {
            assert_eq!(found, SCHEMA_VERSION + 1);
            assert_eq!(supported, SCHEMA_VERSION);
        }
        other => panic!("expected schema mismatch, got {other:?}"),
    }
}
