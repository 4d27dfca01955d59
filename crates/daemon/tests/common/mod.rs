//! Shared helpers for daemon integration tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::Semaphore;

use ::common::crypto::{create_local_author, LocalAuthor};
use ::common::grid::{Grid, MemoryGrid};
use magic_folder_daemon::folder::FolderOptions;
use magic_folder_daemon::upload::JobReceiver;
use magic_folder_daemon::{Database, DuplicatePolicy, Folder, FolderConfig, ServiceConfig};

/// A managed directory and its stash, removed on drop
pub struct TestFolder {
    pub dir: TempDir,
    pub root: PathBuf,
    pub stash: PathBuf,
}

impl TestFolder {
    pub fn new() -> Self {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("folder");
        let stash = dir.path().join("stash");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::create_dir_all(&stash).unwrap();
        // canonical so paths compare equal to what the creator reports
        let root = std::fs::canonicalize(root).unwrap();
        Self { dir, root, stash }
    }

    /// Write `content` to `relpath` under the folder root
    pub fn write(&self, relpath: &str, content: &[u8]) -> PathBuf {
        let path = self.root.join(relpath);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn read(&self, relpath: &str) -> Vec<u8> {
        std::fs::read(self.root.join(relpath)).unwrap()
    }

    pub fn db_path(&self) -> PathBuf {
        self.dir.path().join("state.sqlite")
    }

    /// Files currently in the stash directory
    pub fn stash_entries(&self) -> Vec<PathBuf> {
        std::fs::read_dir(&self.stash)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect()
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn setup_author(name: &str) -> LocalAuthor {
    create_local_author(name).unwrap()
}

pub fn options(
    folder: &TestFolder,
    author: LocalAuthor,
    policy: DuplicatePolicy,
    workers: usize,
) -> FolderOptions {
    FolderOptions {
        name: "default".to_string(),
        root: folder.root.clone(),
        stash: folder.stash.clone(),
        author,
        policy,
        pool: Arc::new(Semaphore::new(workers)),
    }
}

/// A folder over an in-memory index, uploading to `grid`
pub async fn setup_folder(
    folder: &TestFolder,
    author: LocalAuthor,
    grid: &MemoryGrid,
    policy: DuplicatePolicy,
) -> (Folder, JobReceiver) {
    let db = Database::in_memory().await.unwrap();
    let grid: Arc<dyn Grid> = Arc::new(grid.clone());
    Folder::new(options(folder, author, policy, 4), db, grid).unwrap()
}

/// Service configuration for one folder, listening on an ephemeral port
pub fn service_config(folder: &TestFolder, name: &str, author: LocalAuthor) -> ServiceConfig {
    ServiceConfig {
        api_listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        upload_retry_delay: Duration::from_millis(50),
        folders: vec![FolderConfig {
            name: name.to_string(),
            path: folder.root.clone(),
            author,
            db_path: Some(folder.db_path()),
            stash_dir: folder.stash.clone(),
        }],
        ..ServiceConfig::default()
    }
}

/// Poll `check` until it holds, failing the test after a few seconds
pub async fn wait_until<F>(mut check: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}
