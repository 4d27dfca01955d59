use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use common::crypto::LocalAuthor;

use crate::capture::DuplicatePolicy;

/// One folder the daemon should manage
#[derive(Debug, Clone)]
pub struct FolderConfig {
    pub name: String,
    /// The directory being synchronized
    pub path: PathBuf,
    pub author: LocalAuthor,
    /// Local Index file; `None` keeps the index in memory
    pub db_path: Option<PathBuf>,
    /// Where captured content is staged until uploaded
    pub stash_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Control API; port 0 picks a free one
    pub api_listen_addr: SocketAddr,
    /// Storage grid web API; `None` uses an in-memory grid
    pub grid_url: Option<Url>,
    pub grid_timeout: Duration,
    /// Capture worker pool size shared by all folders
    pub max_workers: usize,
    pub duplicate_policy: DuplicatePolicy,
    pub upload_retry_delay: Duration,
    pub folders: Vec<FolderConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_listen_addr: SocketAddr::from(([127, 0, 0, 1], 5050)),
            grid_url: None,
            grid_timeout: Duration::from_secs(60),
            max_workers: 4,
            duplicate_policy: DuplicatePolicy::default(),
            upload_retry_delay: Duration::from_secs(30),
            folders: Vec::new(),
        }
    }
}
