use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{oneshot, Notify, Semaphore};

use common::snapshot::LocalSnapshot;

use super::{CaptureError, DuplicatePolicy, LocalSnapshotCreator, PathLocks};
use crate::upload::JobDispatcher;

type Reply = oneshot::Sender<Result<LocalSnapshot, CaptureError>>;

struct Pending {
    absolute: PathBuf,
    reply: Reply,
}

/// Submissions for one path that no worker has picked up yet
#[derive(Default)]
struct PathQueue {
    pending: VecDeque<Pending>,
}

struct Inner {
    creator: LocalSnapshotCreator,
    policy: DuplicatePolicy,
    pool: Arc<Semaphore>,
    locks: PathLocks,
    queues: parking_lot::Mutex<HashMap<String, PathQueue>>,
    stopped: AtomicBool,
    dispatcher: Option<JobDispatcher>,
    idle: Notify,
}

/// Serializes captures per path on top of a shared worker pool
///
/// Each path with outstanding submissions has exactly one worker task. The
/// worker takes a permit from the pool, pops its next submission (or, under
/// [`DuplicatePolicy::Coalesce`], every waiting submission), and runs the
/// capture under the path's lock. The task exits when its queue is empty.
#[derive(Clone)]
pub struct CaptureService {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for CaptureService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureService")
            .field("root", &self.inner.creator.root())
            .field("policy", &self.inner.policy)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

impl CaptureService {
    /// `dispatcher` receives an upload job after every successful capture
    pub fn new(
        creator: LocalSnapshotCreator,
        policy: DuplicatePolicy,
        pool: Arc<Semaphore>,
        locks: PathLocks,
        dispatcher: Option<JobDispatcher>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                creator,
                policy,
                pool,
                locks,
                queues: parking_lot::Mutex::new(HashMap::new()),
                stopped: AtomicBool::new(false),
                dispatcher,
                idle: Notify::new(),
            }),
        }
    }

    pub fn creator(&self) -> &LocalSnapshotCreator {
        &self.inner.creator
    }

    pub fn policy(&self) -> DuplicatePolicy {
        self.inner.policy
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Capture `path` and wait until the snapshot is durable
    ///
    /// Validation failures are reported before anything is queued.
    pub async fn submit(&self, path: impl AsRef<Path>) -> Result<LocalSnapshot, CaptureError> {
        if self.is_stopped() {
            return Err(CaptureError::Stopped);
        }
        let (relpath, absolute) = self.inner.creator.validate(path.as_ref()).await?;

        let (reply, rx) = oneshot::channel();
        let spawn_worker = {
            let mut queues = self.inner.queues.lock();
            // stop() may have run while validating
            if self.is_stopped() {
                return Err(CaptureError::Stopped);
            }
            let pending = Pending { absolute, reply };
            match queues.entry(relpath.clone()) {
                Entry::Occupied(mut entry) => {
                    entry.get_mut().pending.push_back(pending);
                    false
                }
                Entry::Vacant(entry) => {
                    entry.insert(PathQueue::default()).pending.push_back(pending);
                    true
                }
            }
        };

        if spawn_worker {
            tokio::spawn(run_path(self.inner.clone(), relpath));
        }

        rx.await.map_err(|_| CaptureError::WorkerGone)?
    }

    /// Submissions for `relpath` still waiting for a worker
    pub fn pending_count(&self, relpath: &str) -> usize {
        self.inner
            .queues
            .lock()
            .get(relpath)
            .map(|q| q.pending.len())
            .unwrap_or(0)
    }

    /// Refuse new submissions and wait for queued ones to finish
    pub async fn stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);

        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.inner.queues.lock().is_empty() {
                break;
            }
            notified.await;
        }
        tracing::debug!(root = %self.inner.creator.root().display(), "capture service stopped");
    }
}

/// Worker for one path; exits once the path has nothing queued
async fn run_path(inner: Arc<Inner>, relpath: String) {
    loop {
        let permit = match inner.pool.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                // pool closed: nothing will ever run these
                let mut queues = inner.queues.lock();
                queues.remove(&relpath);
                inner.idle.notify_waiters();
                return;
            }
        };

        let batch: Vec<Pending> = {
            let mut queues = inner.queues.lock();
            let Some(queue) = queues.get_mut(&relpath) else {
                return;
            };
            // callers that went away don't need a capture
            queue.pending.retain(|p| !p.reply.is_closed());

            let batch: Vec<Pending> = match inner.policy {
                DuplicatePolicy::Queue => queue.pending.pop_front().into_iter().collect(),
                DuplicatePolicy::Coalesce => queue.pending.drain(..).collect(),
            };
            if batch.is_empty() {
                queues.remove(&relpath);
                inner.idle.notify_waiters();
                return;
            }
            batch
        };

        let Some(absolute) = batch.last().map(|p| p.absolute.clone()) else {
            continue;
        };

        let result = {
            let _guard = inner.locks.lock(&relpath).await;
            inner.creator.create(&relpath, &absolute).await
        };
        drop(permit);

        match &result {
            Ok(snapshot) => {
                tracing::info!(
                    relpath = %relpath,
                    identifier = %snapshot.identifier,
                    waiters = batch.len(),
                    "captured local snapshot"
                );
                if let Some(dispatcher) = &inner.dispatcher {
                    if let Err(e) = dispatcher.dispatch_upload(relpath.clone()) {
                        tracing::warn!(relpath = %relpath, error = %e, "failed to queue upload");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(relpath = %relpath, error = %e, "capture failed");
            }
        }

        for pending in batch {
            let _ = pending.reply.send(result.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::TempDir;

    use common::crypto::create_local_author;

    use super::*;
    use crate::database::Database;
    use crate::upload::{Job, JobDispatcher};

    async fn service(dir: &TempDir, permits: usize) -> (CaptureService, Arc<Semaphore>) {
        let root = dir.path().join("folder");
        std::fs::create_dir_all(&root).unwrap();
        let creator = LocalSnapshotCreator::new(
            &root,
            dir.path().join("stash"),
            create_local_author("alice").unwrap(),
            Database::in_memory().await.unwrap(),
        )
        .unwrap();
        let pool = Arc::new(Semaphore::new(permits));
        let service = CaptureService::new(
            creator,
            DuplicatePolicy::Queue,
            pool.clone(),
            PathLocks::new(),
            None,
        );
        (service, pool)
    }

    #[tokio::test]
    async fn test_submit_dispatches_upload() {
        let dir = TempDir::new().unwrap();
        let (plain, _) = service(&dir, 2).await;
        let (dispatcher, receiver) = JobDispatcher::new();
        let service = CaptureService::new(
            plain.creator().clone(),
            DuplicatePolicy::Queue,
            Arc::new(Semaphore::new(2)),
            PathLocks::new(),
            Some(dispatcher),
        );

        std::fs::write(service.creator().root().join("foo"), b"foo").unwrap();
        service.submit("foo").await.unwrap();

        assert_eq!(
            receiver.try_recv(),
            Some(Job::UploadSnapshot { relpath: "foo".into() })
        );
    }

    #[tokio::test]
    async fn test_validation_errors_are_not_queued() {
        let dir = TempDir::new().unwrap();
        let (service, _) = service(&dir, 1).await;

        let err = service.submit("missing").await.unwrap_err();
        assert!(matches!(err, CaptureError::Validation(_)));
        assert_eq!(service.pending_count("missing"), 0);
    }

    #[tokio::test]
    async fn test_abandoned_submission_is_skipped() {
        let dir = TempDir::new().unwrap();
        let (service, pool) = service(&dir, 1).await;
        std::fs::write(service.creator().root().join("foo"), b"foo").unwrap();

        let held = pool.clone().acquire_owned().await.unwrap();
        let abandoned = {
            let service = service.clone();
            tokio::spawn(async move { service.submit("foo").await })
        };
        while service.pending_count("foo") < 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        abandoned.abort();
        let _ = abandoned.await;
        drop(held);

        service.stop().await;
        let stored = service
            .creator()
            .database()
            .get_local_snapshot("foo", service.creator().author())
            .await
            .unwrap();
        assert!(stored.is_none());
    }
}
