//! Background job queue for uploads
//!
//! A lightweight flume channel between the capture service, which queues an
//! upload after every capture, and the folder's upload worker.

use anyhow::Result;

/// Background jobs for the upload worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    /// Upload whatever local chain is pending for a path
    ///
    /// Jobs name a path, not a snapshot: the worker reads the current head
    /// when it gets to the job, so duplicates are cheap no-ops.
    UploadSnapshot {
        /// Relative path, `/`-separated
        relpath: String,
    },
}

/// Cloneable handle for queueing jobs
#[derive(Debug, Clone)]
pub struct JobDispatcher {
    tx: flume::Sender<Job>,
}

impl JobDispatcher {
    /// Create a dispatcher and the receiver for its worker
    pub fn new() -> (Self, JobReceiver) {
        let (tx, rx) = flume::unbounded();
        (Self { tx }, JobReceiver { rx })
    }

    /// Queue a job; fails only once the worker is gone
    pub fn dispatch(&self, job: Job) -> Result<()> {
        self.tx
            .send(job)
            .map_err(|_| anyhow::anyhow!("job receiver has been dropped"))
    }

    pub fn dispatch_upload(&self, relpath: impl Into<String>) -> Result<()> {
        self.dispatch(Job::UploadSnapshot {
            relpath: relpath.into(),
        })
    }
}

/// Receiving end, owned by the worker task
#[derive(Debug)]
pub struct JobReceiver {
    rx: flume::Receiver<Job>,
}

impl JobReceiver {
    /// Take a job if one is queued
    pub fn try_recv(&self) -> Option<Job> {
        self.rx.try_recv().ok()
    }

    /// Wait for the next job; `None` once every dispatcher is dropped
    pub async fn recv_async(&self) -> Option<Job> {
        self.rx.recv_async().await.ok()
    }

    /// Convert into an async stream for a worker loop
    pub fn into_async(self) -> flume::r#async::RecvStream<'static, Job> {
        self.rx.into_stream()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
