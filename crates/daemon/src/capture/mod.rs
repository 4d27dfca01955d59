//! Local Capture Service
//!
//! Turns "this file changed" into a durable [`LocalSnapshot`] chained onto
//! the previous capture of the same path. Captures of one path run strictly
//! one at a time and in submission order; different paths run concurrently,
//! bounded by a shared worker pool.
//!
//! [`LocalSnapshot`]: common::snapshot::LocalSnapshot

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::OwnedMutexGuard;

use crate::database::DatabaseError;

mod creator;
mod service;

pub use creator::LocalSnapshotCreator;
pub use service::CaptureService;

/// Why a submitted path was refused before anything was captured
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathValidationError {
    #[error("not a regular file: {0}")]
    NotAFile(PathBuf),
    #[error("outside the folder: {0}")]
    OutsideFolder(PathBuf),
    #[error("ignored path: {0}")]
    Ignored(PathBuf),
}

/// Failure of one submission, delivered to every caller waiting on it
#[derive(Debug, Clone, thiserror::Error)]
pub enum CaptureError {
    #[error(transparent)]
    Validation(#[from] PathValidationError),
    #[error("failed to stage {relpath}: {source}")]
    Stage {
        relpath: String,
        #[source]
        source: Arc<std::io::Error>,
    },
    #[error("local index error: {0}")]
    Index(#[source] Arc<DatabaseError>),
    #[error("capture service is stopped")]
    Stopped,
    #[error("capture worker exited before finishing")]
    WorkerGone,
}

impl From<DatabaseError> for CaptureError {
    fn from(e: DatabaseError) -> Self {
        CaptureError::Index(Arc::new(e))
    }
}

/// What to do with a submission for a path that is already being captured
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Every submission gets its own capture, in order
    #[default]
    Queue,
    /// Submissions still waiting collapse into one capture whose result
    /// they all share
    Coalesce,
}

impl std::str::FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queue" => Ok(DuplicatePolicy::Queue),
            "coalesce" => Ok(DuplicatePolicy::Coalesce),
            other => Err(format!("unknown duplicate policy: {}", other)),
        }
    }
}

impl std::fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DuplicatePolicy::Queue => f.write_str("queue"),
            DuplicatePolicy::Coalesce => f.write_str("coalesce"),
        }
    }
}

/// Per-path async locks
///
/// Held by a capture from reading the previous snapshot until the new one is
/// stored, and by the uploader while it rewrites the local chain, so the two
/// never interleave on one path.
#[derive(Debug, Clone, Default)]
pub struct PathLocks {
    locks: Arc<parking_lot::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, relpath: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .lock()
            .entry(relpath.to_string())
            .or_default()
            .clone();
        lock.lock_owned().await
    }
}
