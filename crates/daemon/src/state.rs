//! On-disk application state
//!
//! ```text
//! ~/.magic-folder/
//!   config.toml
//!   folders/<name>/author.pem
//!   folders/<name>/state.sqlite
//!   folders/<name>/stash/
//! ```

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use common::crypto::{KeyError, LocalAuthor, SecretKey};

use crate::capture::DuplicatePolicy;
use crate::service_config::{Config as ServiceConfig, FolderConfig};

pub const APP_DIR_NAME: &str = ".magic-folder";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const FOLDERS_DIR_NAME: &str = "folders";
pub const AUTHOR_KEY_FILE_NAME: &str = "author.pem";
pub const DATABASE_FILE_NAME: &str = "state.sqlite";
pub const STASH_DIR_NAME: &str = "stash";

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("could not determine home directory")]
    NoHomeDirectory,
    #[error("not initialized: {0} does not exist (run `magic-folder init`)")]
    NotInitialized(PathBuf),
    #[error("already initialized at {0}")]
    AlreadyInitialized(PathBuf),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    ConfigParse(#[from] toml::de::Error),
    #[error("failed to write config: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),
    #[error("invalid api_listen_addr {0:?}")]
    InvalidListenAddr(String),
    #[error("author key error: {0}")]
    Key(#[from] KeyError),
    #[error("invalid folder name {0:?}")]
    InvalidFolderName(String),
    #[error("folder {0:?} already exists")]
    FolderExists(String),
    #[error("unknown folder {0:?}")]
    UnknownFolder(String),
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
}

/// A folder entry in `config.toml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderEntry {
    /// The directory being synchronized
    pub path: PathBuf,
    /// Author name attached to this folder's snapshots
    pub author: String,
}

fn default_api_listen_addr() -> String {
    "127.0.0.1:5050".to_string()
}

fn default_max_workers() -> usize {
    4
}

fn default_upload_retry_secs() -> u64 {
    30
}

fn default_grid_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_api_listen_addr")]
    pub api_listen_addr: String,
    /// Storage grid web API; unset means an in-memory grid
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_url: Option<Url>,
    #[serde(default = "default_grid_timeout_secs")]
    pub grid_timeout_secs: u64,
    /// Capture worker pool size shared by all folders
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,
    #[serde(default = "default_upload_retry_secs")]
    pub upload_retry_secs: u64,
    #[serde(default)]
    pub folders: BTreeMap<String, FolderEntry>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_listen_addr: default_api_listen_addr(),
            grid_url: None,
            grid_timeout_secs: default_grid_timeout_secs(),
            max_workers: default_max_workers(),
            duplicate_policy: DuplicatePolicy::default(),
            upload_retry_secs: default_upload_retry_secs(),
            folders: BTreeMap::new(),
        }
    }
}

/// Files belonging to one managed folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderPaths {
    pub dir: PathBuf,
    pub key_path: PathBuf,
    pub db_path: PathBuf,
    pub stash_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub app_dir: PathBuf,
    pub config_path: PathBuf,
    pub config: AppConfig,
}

impl AppState {
    /// `custom`, or `~/.magic-folder`
    pub fn app_dir(custom: Option<PathBuf>) -> Result<PathBuf, StateError> {
        match custom {
            Some(dir) => Ok(dir),
            None => dirs::home_dir()
                .map(|home| home.join(APP_DIR_NAME))
                .ok_or(StateError::NoHomeDirectory),
        }
    }

    /// Create the application directory and write `config`
    pub fn init(custom: Option<PathBuf>, config: Option<AppConfig>) -> Result<Self, StateError> {
        let app_dir = Self::app_dir(custom)?;
        let config_path = app_dir.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            return Err(StateError::AlreadyInitialized(app_dir));
        }

        std::fs::create_dir_all(app_dir.join(FOLDERS_DIR_NAME))?;
        let state = Self {
            app_dir,
            config_path,
            config: config.unwrap_or_default(),
        };
        state.save()?;

        tracing::info!(dir = %state.app_dir.display(), "initialized application directory");
        Ok(state)
    }

    pub fn load(custom: Option<PathBuf>) -> Result<Self, StateError> {
        let app_dir = Self::app_dir(custom)?;
        let config_path = app_dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Err(StateError::NotInitialized(app_dir));
        }

        let raw = std::fs::read_to_string(&config_path)?;
        let config: AppConfig = toml::from_str(&raw)?;

        Ok(Self {
            app_dir,
            config_path,
            config,
        })
    }

    /// Write the config back, replacing the file atomically
    pub fn save(&self) -> Result<(), StateError> {
        let raw = toml::to_string_pretty(&self.config)?;
        let temp = self.config_path.with_extension("toml.tmp");
        std::fs::write(&temp, raw)?;
        std::fs::rename(&temp, &self.config_path)?;
        Ok(())
    }

    pub fn folder_paths(&self, name: &str) -> FolderPaths {
        let dir = self.app_dir.join(FOLDERS_DIR_NAME).join(name);
        FolderPaths {
            key_path: dir.join(AUTHOR_KEY_FILE_NAME),
            db_path: dir.join(DATABASE_FILE_NAME),
            stash_dir: dir.join(STASH_DIR_NAME),
            dir,
        }
    }

    /// Start managing `path` as folder `name`, with a fresh author key
    pub fn add_folder(
        &mut self,
        name: &str,
        path: &Path,
        author: &str,
    ) -> Result<FolderPaths, StateError> {
        if !is_valid_folder_name(name) {
            return Err(StateError::InvalidFolderName(name.to_string()));
        }
        if self.config.folders.contains_key(name) {
            return Err(StateError::FolderExists(name.to_string()));
        }
        if !path.is_dir() {
            return Err(StateError::NotADirectory(path.to_path_buf()));
        }
        let path = std::fs::canonicalize(path)?;

        let paths = self.folder_paths(name);
        std::fs::create_dir_all(&paths.stash_dir)?;
        std::fs::write(&paths.key_path, SecretKey::generate()?.to_pem())?;

        self.config.folders.insert(
            name.to_string(),
            FolderEntry {
                path,
                author: author.to_string(),
            },
        );
        self.save()?;

        tracing::info!(folder = %name, "added folder");
        Ok(paths)
    }

    pub fn load_author(&self, name: &str) -> Result<LocalAuthor, StateError> {
        let entry = self
            .config
            .folders
            .get(name)
            .ok_or_else(|| StateError::UnknownFolder(name.to_string()))?;
        let raw = std::fs::read_to_string(self.folder_paths(name).key_path)?;
        Ok(LocalAuthor::new(entry.author.clone(), SecretKey::from_pem(&raw)?))
    }

    /// The daemon configuration described by this state
    pub fn service_config(&self) -> Result<ServiceConfig, StateError> {
        let api_listen_addr: SocketAddr = self
            .config
            .api_listen_addr
            .parse()
            .map_err(|_| StateError::InvalidListenAddr(self.config.api_listen_addr.clone()))?;

        let mut folders = Vec::with_capacity(self.config.folders.len());
        for (name, entry) in &self.config.folders {
            let paths = self.folder_paths(name);
            folders.push(FolderConfig {
                name: name.clone(),
                path: entry.path.clone(),
                author: self.load_author(name)?,
                db_path: Some(paths.db_path),
                stash_dir: paths.stash_dir,
            });
        }

        Ok(ServiceConfig {
            api_listen_addr,
            grid_url: self.config.grid_url.clone(),
            grid_timeout: Duration::from_secs(self.config.grid_timeout_secs),
            max_workers: self.config.max_workers,
            duplicate_policy: self.config.duplicate_policy,
            upload_retry_delay: Duration::from_secs(self.config.upload_retry_secs),
            folders,
        })
    }
}

fn is_valid_folder_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_init_and_load() {
        let dir = TempDir::new().unwrap();
        let app_dir = dir.path().join("app");

        let state = AppState::init(Some(app_dir.clone()), None).unwrap();
        assert!(state.config_path.exists());
        assert!(matches!(
            AppState::init(Some(app_dir.clone()), None),
            Err(StateError::AlreadyInitialized(_))
        ));

        let loaded = AppState::load(Some(app_dir)).unwrap();
        assert_eq!(loaded.config, AppConfig::default());
    }

    #[test]
    fn test_load_uninitialized() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            AppState::load(Some(dir.path().join("nope"))),
            Err(StateError::NotInitialized(_))
        ));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            grid_url = "http://127.0.0.1:3456/"
            duplicate_policy = "coalesce"
            "#,
        )
        .unwrap();
        assert_eq!(config.duplicate_policy, DuplicatePolicy::Coalesce);
        assert_eq!(config.max_workers, 4);
        assert_eq!(config.api_listen_addr, "127.0.0.1:5050");
        assert!(config.folders.is_empty());
    }

    #[test]
    fn test_add_folder_and_service_config() {
        let dir = TempDir::new().unwrap();
        let synced = dir.path().join("docs");
        std::fs::create_dir(&synced).unwrap();
        let mut state = AppState::init(Some(dir.path().join("app")), None).unwrap();

        let paths = state.add_folder("docs", &synced, "alice").unwrap();
        assert!(paths.key_path.exists());
        assert!(paths.stash_dir.is_dir());

        assert!(matches!(
            state.add_folder("docs", &synced, "alice"),
            Err(StateError::FolderExists(_))
        ));
        assert!(matches!(
            state.add_folder("bad/name", &synced, "alice"),
            Err(StateError::InvalidFolderName(_))
        ));
        assert!(matches!(
            state.add_folder("missing", &dir.path().join("missing"), "alice"),
            Err(StateError::NotADirectory(_))
        ));

        // survives a reload, key included
        let reloaded = AppState::load(Some(dir.path().join("app"))).unwrap();
        let author = reloaded.load_author("docs").unwrap();
        assert_eq!(author.name(), "alice");
        assert_eq!(author, state.load_author("docs").unwrap());

        let config = reloaded.service_config().unwrap();
        assert_eq!(config.folders.len(), 1);
        assert_eq!(config.folders[0].name, "docs");
        assert_eq!(config.folders[0].db_path, Some(paths.db_path));
        assert_eq!(config.api_listen_addr.port(), 5050);
    }
}
