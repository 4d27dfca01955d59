use std::path::PathBuf;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Metadata, SnapshotError};
use crate::crypto::LocalAuthor;
use crate::grid::Capability;

/// A captured edit that has not been uploaded yet
///
/// Snapshots are never mutated once created; a later edit of the same path
/// produces a new snapshot whose `parents_local` holds this one. The only
/// exception is [`LocalSnapshot::replace_uploaded`], which rewrites a chain
/// after one of its members reached the grid.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalSnapshot {
    /// Fresh per capture, never part of the uploaded commit
    pub identifier: Uuid,
    /// Relative path, `/`-separated
    pub name: String,
    pub author: LocalAuthor,
    pub metadata: Metadata,
    /// Where the captured bytes were staged
    pub content_path: PathBuf,
    /// POSIX seconds at capture
    pub timestamp: i64,
    pub parents_local: Vec<LocalSnapshot>,
    pub parents_remote: Vec<Capability>,
}

impl LocalSnapshot {
    pub fn new(
        name: impl Into<String>,
        author: LocalAuthor,
        metadata: Metadata,
        content_path: PathBuf,
        timestamp: i64,
        parents_local: Vec<LocalSnapshot>,
        parents_remote: Vec<Capability>,
    ) -> Self {
        Self {
            identifier: Uuid::new_v4(),
            name: name.into(),
            author,
            metadata,
            content_path,
            timestamp,
            parents_local,
            parents_remote,
        }
    }

    /// This snapshot followed by its local ancestors, newest first
    ///
    /// Follows the first local parent; local history is linear.
    pub fn chain(&self) -> impl Iterator<Item = &LocalSnapshot> {
        std::iter::successors(Some(self), |s| s.parents_local.first())
    }

    pub fn chain_len(&self) -> usize {
        self.chain().count()
    }

    /// Read the staged content
    pub async fn read_content(&self) -> Result<Bytes, SnapshotError> {
        tokio::fs::read(&self.content_path)
            .await
            .map(Bytes::from)
            .map_err(|source| SnapshotError::Io {
                path: self.content_path.clone(),
                source,
            })
    }

    /// Splice the ancestor `identifier` out of this chain, putting
    /// `capability` in its place among the remote parents of its child
    ///
    /// Returns `false` when no ancestor has that identifier.
    pub fn replace_uploaded(&mut self, identifier: Uuid, capability: &Capability) -> bool {
        if let Some(pos) = self
            .parents_local
            .iter()
            .position(|p| p.identifier == identifier)
        {
            self.parents_local.remove(pos);
            self.parents_remote.push(capability.clone());
            return true;
        }
        self.parents_local
            .iter_mut()
            .any(|p| p.replace_uploaded(identifier, capability))
    }

    /// Every staged content file referenced by this chain
    pub fn content_paths(&self) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        let mut stack = vec![self];
        while let Some(s) = stack.pop() {
            paths.push(s.content_path.clone());
            stack.extend(s.parents_local.iter());
        }
        paths
    }

    /// The persistable form, without any key material
    pub fn to_record(&self) -> LocalSnapshotRecord {
        LocalSnapshotRecord {
            identifier: self.identifier,
            name: self.name.clone(),
            metadata: self.metadata.clone(),
            content_path: self.content_path.clone(),
            timestamp: self.timestamp,
            parents_local: self.parents_local.iter().map(|p| p.to_record()).collect(),
            parents_remote: self.parents_remote.clone(),
        }
    }

    /// Rebuild a snapshot chain, attributing every member to `author`
    pub fn from_record(record: LocalSnapshotRecord, author: &LocalAuthor) -> Self {
        Self {
            identifier: record.identifier,
            name: record.name,
            author: author.clone(),
            metadata: record.metadata,
            content_path: record.content_path,
            timestamp: record.timestamp,
            parents_local: record
                .parents_local
                .into_iter()
                .map(|p| Self::from_record(p, author))
                .collect(),
            parents_remote: record.parents_remote,
        }
    }
}

/// Serialized [`LocalSnapshot`] chain as kept in the local index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalSnapshotRecord {
    pub identifier: Uuid,
    pub name: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub content_path: PathBuf,
    pub timestamp: i64,
    #[serde(default)]
    pub parents_local: Vec<LocalSnapshotRecord>,
    #[serde(default)]
    pub parents_remote: Vec<Capability>,
}
