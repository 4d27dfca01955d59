//! Core of magic-folder: the snapshot DAG and everything it needs that does not
//! touch a local database.
//!
//! - [`magic_path`]: reversible flattening of relative paths into single names
//! - [`crypto`]: author identities and ed25519 signing
//! - [`grid`]: the storage grid seam and its HTTP / in-memory backends
//! - [`snapshot`]: local and remote snapshots, the commit protocol and
//!   ancestry classification

pub mod crypto;
pub mod grid;
pub mod magic_path;
pub mod snapshot;

pub mod prelude {
    pub use crate::crypto::{create_local_author, LocalAuthor, PublicKey, RemoteAuthor, SecretKey};
    pub use crate::grid::{Capability, Grid, GridError, HttpGrid, MemoryGrid, StorageApiError};
    pub use crate::magic_path::{magic2path, path2magic, should_ignore_file, MagicPathError};
    pub use crate::snapshot::{
        create_remote_snapshot, upload_local_snapshot, LocalSnapshot, Metadata, NewSnapshot,
        RemoteSnapshot, SnapshotError,
    };
}
