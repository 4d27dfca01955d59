use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::watch::Receiver as WatchReceiver;

use common::crypto::LocalAuthor;
use common::grid::Grid;
use common::snapshot::{upload_local_snapshot, RemoteSnapshot, SnapshotError};

use super::{Job, JobDispatcher, JobReceiver};
use crate::capture::PathLocks;
use crate::database::{Database, DatabaseError, UploadOutcome};

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("local index error: {0}")]
    Index(#[from] DatabaseError),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
}

impl UploadError {
    /// Grid failures are worth another attempt; local ones are not
    pub fn is_retryable(&self) -> bool {
        match self {
            UploadError::Index(_) => false,
            UploadError::Snapshot(e) => e.is_retryable(),
        }
    }
}

/// Moves a folder's pending local snapshots onto the grid
#[derive(Debug, Clone)]
pub struct Uploader {
    db: Database,
    grid: Arc<dyn Grid>,
    author: LocalAuthor,
    locks: PathLocks,
    dispatcher: JobDispatcher,
    retry_delay: Duration,
}

impl Uploader {
    /// `dispatcher` is where failed jobs are re-queued; normally the sender
    /// for the receiver this uploader is run on
    pub fn new(
        db: Database,
        grid: Arc<dyn Grid>,
        author: LocalAuthor,
        locks: PathLocks,
        dispatcher: JobDispatcher,
        retry_delay: Duration,
    ) -> Self {
        Self {
            db,
            grid,
            author,
            locks,
            dispatcher,
            retry_delay,
        }
    }

    /// Upload the pending local chain for `relpath`
    ///
    /// Returns the commit for the head that was uploaded, or `None` when
    /// nothing was pending. The grid work happens without the path lock, so
    /// captures may add a newer head meanwhile; completion then splices the
    /// uploaded snapshot out from under it.
    pub async fn upload_path(&self, relpath: &str) -> Result<Option<RemoteSnapshot>, UploadError> {
        let Some(local) = self.db.get_local_snapshot(relpath, &self.author).await? else {
            return Ok(None);
        };

        let remote = upload_local_snapshot(self.grid.as_ref(), &local).await?;

        let outcome = {
            let _guard = self.locks.lock(relpath).await;
            self.db
                .complete_upload(&self.author, local.identifier, &remote)
                .await?
        };

        match outcome {
            UploadOutcome::Removed | UploadOutcome::Spliced => {
                for path in local.content_paths() {
                    if let Err(e) = tokio::fs::remove_file(&path).await {
                        tracing::warn!(path = %path.display(), error = %e, "failed to remove staged content");
                    }
                }
            }
            UploadOutcome::Stale => {
                tracing::debug!(relpath = %relpath, identifier = %local.identifier, "upload already completed");
            }
        }

        Ok(Some(remote))
    }

    pub async fn handle(&self, job: Job) {
        match job {
            Job::UploadSnapshot { relpath } => match self.upload_path(&relpath).await {
                Ok(Some(remote)) => {
                    tracing::info!(
                        relpath = %relpath,
                        capability = %remote.capability,
                        "uploaded snapshot"
                    );
                }
                Ok(None) => {
                    tracing::debug!(relpath = %relpath, "nothing to upload");
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!(
                        relpath = %relpath,
                        error = %e,
                        retry_in = ?self.retry_delay,
                        "upload failed, will retry"
                    );
                    let dispatcher = self.dispatcher.clone();
                    let delay = self.retry_delay;
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        if let Err(e) = dispatcher.dispatch_upload(relpath) {
                            tracing::debug!(error = %e, "upload retry dropped");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(relpath = %relpath, error = %e, "upload failed");
                }
            },
        }
    }
}

/// Process upload jobs until shutdown is signalled or the queue closes
pub async fn run_worker(uploader: Uploader, receiver: JobReceiver, mut shutdown_rx: WatchReceiver<()>) {
    tracing::info!(author = %uploader.author.name(), "starting upload worker");

    let mut stream = receiver.into_async();
    loop {
        tokio::select! {
            Some(job) = stream.next() => {
                uploader.handle(job).await;
            }
            _ = shutdown_rx.changed() => {
                break;
            }
            else => {
                break;
            }
        }
    }

    tracing::info!(author = %uploader.author.name(), "upload worker stopped");
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use tempfile::TempDir;

    use common::crypto::create_local_author;
    use common::grid::{GridOperation, MemoryGrid};
    use common::snapshot::{LocalSnapshot, Metadata};

    use super::*;

    fn staged(dir: &TempDir, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    async fn setup() -> (TempDir, MemoryGrid, Uploader, JobReceiver) {
        let dir = TempDir::new().unwrap();
        let grid = MemoryGrid::new();
        let (dispatcher, receiver) = JobDispatcher::new();
        let uploader = Uploader::new(
            Database::in_memory().await.unwrap(),
            Arc::new(grid.clone()),
            create_local_author("alice").unwrap(),
            PathLocks::new(),
            dispatcher,
            Duration::from_millis(10),
        );
        (dir, grid, uploader, receiver)
    }

    #[tokio::test]
    async fn test_upload_path_clears_local_and_stash() {
        let (dir, grid, uploader, _rx) = setup().await;
        let content = staged(&dir, "c1", b"hello");
        let local = LocalSnapshot::new(
            "foo",
            uploader.author.clone(),
            Metadata::new(),
            content.clone(),
            1,
            vec![],
            vec![],
        );
        uploader.db.store_local_snapshot(&local).await.unwrap();

        let remote = uploader.upload_path("foo").await.unwrap().unwrap();

        assert_eq!(grid.get(&remote.content_cap).await.unwrap().as_ref(), b"hello");
        assert!(uploader
            .db
            .get_local_snapshot("foo", &uploader.author)
            .await
            .unwrap()
            .is_none());
        assert_eq!(
            uploader.db.get_remote_snapshot("foo").await.unwrap(),
            Some(remote)
        );
        assert!(!content.exists());
    }

    #[tokio::test]
    async fn test_upload_path_with_nothing_pending() {
        let (_dir, _grid, uploader, _rx) = setup().await;
        assert!(uploader.upload_path("foo").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_grid_failure_is_requeued() {
        let (dir, grid, uploader, receiver) = setup().await;
        let local = LocalSnapshot::new(
            "foo",
            uploader.author.clone(),
            Metadata::new(),
            staged(&dir, "c1", b"x"),
            1,
            vec![],
            vec![],
        );
        uploader.db.store_local_snapshot(&local).await.unwrap();
        grid.set_failing(GridOperation::PutImmutable, true);

        uploader
            .handle(Job::UploadSnapshot { relpath: "foo".into() })
            .await;

        let retried = tokio::time::timeout(Duration::from_secs(2), receiver.recv_async())
            .await
            .unwrap();
        assert_eq!(retried, Some(Job::UploadSnapshot { relpath: "foo".into() }));
        // still pending locally
        assert!(uploader
            .db
            .get_local_snapshot("foo", &uploader.author)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_missing_content_is_not_retried() {
        let (dir, _grid, uploader, receiver) = setup().await;
        let local = LocalSnapshot::new(
            "foo",
            uploader.author.clone(),
            Metadata::new(),
            dir.path().join("gone"),
            1,
            vec![],
            vec![],
        );
        uploader.db.store_local_snapshot(&local).await.unwrap();

        let err = uploader.upload_path("foo").await.unwrap_err();
        assert!(!err.is_retryable());

        uploader
            .handle(Job::UploadSnapshot { relpath: "foo".into() })
            .await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(receiver.is_empty());
    }
}
