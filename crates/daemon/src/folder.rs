//! A managed folder: capture, upload and ingest wired around one Local Index

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use uuid::Uuid;

use common::crypto::LocalAuthor;
use common::grid::{Capability, Grid};
use common::magic_path::should_ignore_file;
use common::snapshot::{classify, Ancestry, LocalSnapshot, RemoteSnapshot, SnapshotError};

use crate::capture::{
    CaptureError, CaptureService, DuplicatePolicy, LocalSnapshotCreator, PathLocks,
};
use crate::database::{Database, DatabaseError};
use crate::upload::{JobDispatcher, JobReceiver, Uploader};

/// One entry of a path's history as reported by [`Folder::list_snapshots`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SnapshotSummary {
    Local {
        identifier: Uuid,
        /// Identifiers of the local parents
        parents: Vec<Uuid>,
        #[serde(rename = "content-path")]
        content_path: PathBuf,
        author: String,
    },
    Remote {
        capability: Capability,
        parents: Vec<Capability>,
        #[serde(rename = "content-capability")]
        content_capability: Capability,
        author: String,
    },
}

impl From<&LocalSnapshot> for SnapshotSummary {
    fn from(snapshot: &LocalSnapshot) -> Self {
        SnapshotSummary::Local {
            identifier: snapshot.identifier,
            parents: snapshot.parents_local.iter().map(|p| p.identifier).collect(),
            content_path: snapshot.content_path.clone(),
            author: snapshot.author.name().to_string(),
        }
    }
}

impl From<&RemoteSnapshot> for SnapshotSummary {
    fn from(snapshot: &RemoteSnapshot) -> Self {
        SnapshotSummary::Remote {
            capability: snapshot.capability.clone(),
            parents: snapshot.parents_raw.clone(),
            content_capability: snapshot.content_cap.clone(),
            author: snapshot.author.name().to_string(),
        }
    }
}

/// What [`Folder::ingest_remote`] did with an incoming commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Nothing to do: it is our head (`Same`) or already behind it (`Behind`)
    UpToDate(Ancestry),
    /// The file was replaced and the commit is our new head
    FastForwarded,
    /// Recorded as a conflict; the file was left alone
    Conflict(Ancestry),
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error("local index error: {0}")]
    Index(#[from] DatabaseError),
    #[error("refusing to write {0:?}: outside the folder or ignored")]
    UnsafePath(String),
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Everything needed to open a [`Folder`]
#[derive(Debug, Clone)]
pub struct FolderOptions {
    pub name: String,
    pub root: PathBuf,
    pub stash: PathBuf,
    pub author: LocalAuthor,
    pub policy: DuplicatePolicy,
    /// Shared capture worker pool
    pub pool: Arc<Semaphore>,
}

#[derive(Debug, Clone)]
pub struct Folder {
    name: String,
    author: LocalAuthor,
    db: Database,
    grid: Arc<dyn Grid>,
    capture: CaptureService,
    locks: PathLocks,
    dispatcher: JobDispatcher,
}

impl Folder {
    /// Open a folder over an already-connected index
    ///
    /// The returned receiver carries the folder's upload jobs; hand it to
    /// [`crate::upload::run_worker`] together with [`Folder::uploader`].
    pub fn new(
        options: FolderOptions,
        db: Database,
        grid: Arc<dyn Grid>,
    ) -> std::io::Result<(Self, JobReceiver)> {
        let (dispatcher, receiver) = JobDispatcher::new();
        let locks = PathLocks::new();

        let creator =
            LocalSnapshotCreator::new(&options.root, options.stash, options.author.clone(), db.clone())?;
        let capture = CaptureService::new(
            creator,
            options.policy,
            options.pool,
            locks.clone(),
            Some(dispatcher.clone()),
        );

        let folder = Self {
            name: options.name,
            author: options.author,
            db,
            grid,
            capture,
            locks,
            dispatcher,
        };
        Ok((folder, receiver))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        self.capture.creator().root()
    }

    pub fn author(&self) -> &LocalAuthor {
        &self.author
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn capture(&self) -> &CaptureService {
        &self.capture
    }

    /// An uploader for this folder's job queue
    pub fn uploader(&self, retry_delay: Duration) -> Uploader {
        Uploader::new(
            self.db.clone(),
            self.grid.clone(),
            self.author.clone(),
            self.locks.clone(),
            self.dispatcher.clone(),
            retry_delay,
        )
    }

    /// Capture `path` (absolute, or relative to the folder root)
    pub async fn submit_snapshot(&self, path: impl AsRef<Path>) -> Result<LocalSnapshot, CaptureError> {
        self.capture.submit(path).await
    }

    /// Queue uploads for every path with pending local snapshots
    ///
    /// Used at startup so captures from a previous run are not stranded.
    pub async fn resume_uploads(&self) -> Result<usize, DatabaseError> {
        let pending = self.db.list_local_snapshots(&self.author).await?;
        for snapshot in &pending {
            if let Err(e) = self.dispatcher.dispatch_upload(snapshot.name.clone()) {
                tracing::warn!(folder = %self.name, error = %e, "failed to queue upload");
            }
        }
        Ok(pending.len())
    }

    /// History per relative path: the local chain newest first, then the
    /// known remote head
    pub async fn list_snapshots(&self) -> Result<BTreeMap<String, Vec<SnapshotSummary>>, DatabaseError> {
        let mut listing: BTreeMap<String, Vec<SnapshotSummary>> = BTreeMap::new();

        for local in self.db.list_local_snapshots(&self.author).await? {
            let entries = listing.entry(local.name.clone()).or_default();
            entries.extend(local.chain().map(SnapshotSummary::from));
        }
        for remote in self.db.list_remote_snapshots().await? {
            listing
                .entry(remote.name.clone())
                .or_default()
                .push(SnapshotSummary::from(&remote));
        }

        Ok(listing)
    }

    /// Apply, skip or flag an incoming commit from another participant
    #[tracing::instrument(skip(self), fields(folder = %self.name))]
    pub async fn ingest_remote(&self, capability: &Capability) -> Result<IngestOutcome, IngestError> {
        let incoming = RemoteSnapshot::fetch(self.grid.as_ref(), capability).await?;
        let relpath = incoming.name.clone();
        if !is_safe_relpath(&relpath) {
            return Err(IngestError::UnsafePath(relpath));
        }

        let _guard = self.locks.lock(&relpath).await;

        let ours = self.db.get_remote_snapshot(&relpath).await?;
        let ancestry = classify(
            self.grid.as_ref(),
            ours.as_ref().map(|r| &r.capability),
            &incoming,
        )
        .await?;

        let outcome = match ancestry {
            Ancestry::Same | Ancestry::Behind => IngestOutcome::UpToDate(ancestry),
            Ancestry::FastForward => {
                let pending = self.db.get_local_snapshot(&relpath, &self.author).await?;
                if pending.is_some() {
                    self.db.record_conflict(&incoming).await?;
                    IngestOutcome::Conflict(ancestry)
                } else {
                    self.write_content(&relpath, &incoming).await?;
                    self.db.store_remote_snapshot(&incoming).await?;
                    IngestOutcome::FastForwarded
                }
            }
            Ancestry::Diverged => {
                self.db.record_conflict(&incoming).await?;
                IngestOutcome::Conflict(ancestry)
            }
        };

        tracing::info!(relpath = %relpath, ?outcome, "ingested remote snapshot");
        Ok(outcome)
    }

    /// Replace the file for `relpath` with the content of `incoming`
    ///
    /// Streams into a hidden temporary next to the target and renames it
    /// into place, so the live file is never half-written.
    async fn write_content(&self, relpath: &str, incoming: &RemoteSnapshot) -> Result<(), IngestError> {
        let target = relpath
            .split('/')
            .fold(self.root().to_path_buf(), |path, segment| path.join(segment));
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| IngestError::Io { path, source }
        };

        let parent = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root().to_path_buf());
        tokio::fs::create_dir_all(&parent)
            .await
            .map_err(io_err(&parent))?;

        let leaf = target
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("download");
        let temp = parent.join(format!("{}.{}.tmp", leaf, Uuid::new_v4()));

        let written: Result<(), IngestError> = async {
            let mut file = tokio::fs::File::create(&temp).await.map_err(io_err(&temp))?;
            incoming.stream_content(self.grid.as_ref(), &mut file).await?;
            file.flush().await.map_err(io_err(&temp))?;
            file.sync_all().await.map_err(io_err(&temp))?;
            tokio::fs::rename(&temp, &target)
                .await
                .map_err(io_err(&target))
        }
        .await;

        if written.is_err() {
            let _ = tokio::fs::remove_file(&temp).await;
        }
        written
    }
}

/// A relative path that stays inside the folder when joined onto it and
/// that local capture would accept
fn is_safe_relpath(relpath: &str) -> bool {
    !relpath.is_empty()
        && !relpath.starts_with('/')
        && relpath
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != ".." && !segment.contains('\\'))
        && !should_ignore_file(Path::new(relpath))
}
