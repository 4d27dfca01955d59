//! Background upload of local snapshots to the grid

mod jobs;
mod worker;

pub use jobs::{Job, JobDispatcher, JobReceiver};
pub use worker::{run_worker, UploadError, Uploader};
