//! Snapshots and the commit protocol
//!
//! A [`LocalSnapshot`] is a captured edit that only exists on this machine; it
//! links to its un-uploaded predecessor through `parents_local`. Uploading
//! turns each link of that chain into an immutable commit directory on the
//! grid, which is read back as a [`RemoteSnapshot`].
//!
//! Commit directory fields:
//!
//! | field              | shape                     |
//! |--------------------|---------------------------|
//! | `content`          | filenode, carries metadata|
//! | `version`          | literal `"1"`             |
//! | `timestamp`        | literal POSIX seconds     |
//! | `name`             | literal magic name        |
//! | `author`           | literal author JSON       |
//! | `author_signature` | literal hex signature     |
//! | `parents`          | list, omitted when empty  |

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::crypto::{AuthorError, KeyError};
use crate::grid::{Capability, GridError};
use crate::magic_path::MagicPathError;

pub mod ancestry;
mod create;
mod local;
mod remote;

pub use ancestry::{classify, is_ancestor, Ancestry};
pub use create::{
    create_commit, create_remote_snapshot, now_timestamp, signing_message, upload_local_snapshot,
    NewSnapshot,
};
pub use local::{LocalSnapshot, LocalSnapshotRecord};
pub use remote::RemoteSnapshot;

/// Commit schema version written into every commit
pub const SNAPSHOT_VERSION: &str = "1";

/// Per-snapshot string metadata, kept sorted so commits are deterministic
pub type Metadata = BTreeMap<String, String>;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error(transparent)]
    MagicPath(#[from] MagicPathError),
    #[error("invalid author: {0}")]
    Author(#[from] AuthorError),
    #[error("invalid signature encoding: {0}")]
    Key(#[from] KeyError),
    #[error("snapshot {0} has a bad author signature")]
    BadSignature(Capability),
    #[error("snapshot {capability} has unsupported version {version:?}")]
    UnsupportedVersion {
        capability: Capability,
        version: String,
    },
    #[error("snapshot {capability} is missing field {field:?}")]
    MissingField {
        capability: Capability,
        field: &'static str,
    },
    #[error("snapshot {capability} has an invalid {field:?} field: {reason}")]
    InvalidField {
        capability: Capability,
        field: &'static str,
        reason: String,
    },
    #[error("failed to read staged content {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SnapshotError {
    /// Whether the failed operation may succeed if retried as is
    pub fn is_retryable(&self) -> bool {
        match self {
            SnapshotError::Grid(e) => e.is_retryable(),
            _ => false,
        }
    }
}
