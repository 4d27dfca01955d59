use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::watch::Receiver as WatchReceiver;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use common::grid::{Grid, GridError, HttpGrid, MemoryGrid};

use crate::database::{Database, DatabaseError};
use crate::folder::{Folder, FolderOptions};
use crate::service_config::Config;
use crate::upload::run_worker;

#[derive(Debug, thiserror::Error)]
pub enum StateSetupError {
    #[error("failed to open local index for {folder}: {source}")]
    Database {
        folder: String,
        #[source]
        source: DatabaseError,
    },
    #[error("failed to open folder {folder}: {source}")]
    Folder {
        folder: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to set up grid client: {0}")]
    Grid(#[from] GridError),
    #[error("duplicate folder name {0:?}")]
    DuplicateFolder(String),
}

#[derive(Debug)]
struct Inner {
    folders: BTreeMap<String, Folder>,
    grid: Arc<dyn Grid>,
}

/// Main service state: every managed folder and the grid they share
#[derive(Debug, Clone)]
pub struct State {
    inner: Arc<Inner>,
}

impl State {
    /// Open every configured folder and spawn its upload worker
    ///
    /// Workers run until `shutdown_rx` fires; their handles are returned so
    /// the caller can wait for them.
    pub async fn from_config(
        config: &Config,
        shutdown_rx: WatchReceiver<()>,
    ) -> Result<(Self, Vec<JoinHandle<()>>), StateSetupError> {
        let grid: Arc<dyn Grid> = match &config.grid_url {
            Some(url) => {
                tracing::info!(grid = %url, "using storage grid");
                Arc::new(HttpGrid::with_timeout(url, config.grid_timeout)?)
            }
            None => {
                tracing::warn!("no grid configured, snapshots are uploaded to an in-memory grid");
                Arc::new(MemoryGrid::new())
            }
        };

        let pool = Arc::new(Semaphore::new(config.max_workers.max(1)));
        let mut folders = BTreeMap::new();
        let mut handles = Vec::new();

        for folder_config in &config.folders {
            let name = folder_config.name.clone();
            if folders.contains_key(&name) {
                return Err(StateSetupError::DuplicateFolder(name));
            }

            let db = match &folder_config.db_path {
                Some(path) => Database::connect(path).await,
                None => Database::in_memory().await,
            }
            .map_err(|source| StateSetupError::Database {
                folder: name.clone(),
                source,
            })?;

            let options = FolderOptions {
                name: name.clone(),
                root: folder_config.path.clone(),
                stash: folder_config.stash_dir.clone(),
                author: folder_config.author.clone(),
                policy: config.duplicate_policy,
                pool: pool.clone(),
            };
            let (folder, receiver) =
                Folder::new(options, db, grid.clone()).map_err(|source| StateSetupError::Folder {
                    folder: name.clone(),
                    source,
                })?;

            let uploader = folder.uploader(config.upload_retry_delay);
            handles.push(tokio::spawn(run_worker(
                uploader,
                receiver,
                shutdown_rx.clone(),
            )));

            match folder.resume_uploads().await {
                Ok(0) => {}
                Ok(n) => tracing::info!(folder = %name, pending = n, "resuming uploads"),
                Err(e) => tracing::warn!(folder = %name, error = %e, "failed to resume uploads"),
            }

            tracing::info!(folder = %name, root = %folder.root().display(), "folder ready");
            folders.insert(name, folder);
        }

        let state = Self {
            inner: Arc::new(Inner { folders, grid }),
        };
        Ok((state, handles))
    }

    pub fn folder(&self, name: &str) -> Option<&Folder> {
        self.inner.folders.get(name)
    }

    pub fn folders(&self) -> impl Iterator<Item = &Folder> {
        self.inner.folders.values()
    }

    pub fn grid(&self) -> &Arc<dyn Grid> {
        &self.inner.grid
    }

    /// Stop accepting captures and wait for queued ones to finish
    pub async fn stop(&self) {
        for folder in self.folders() {
            folder.capture().stop().await;
        }
    }
}
