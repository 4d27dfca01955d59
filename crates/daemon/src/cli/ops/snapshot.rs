use std::fmt;

use clap::Args;
use owo_colors::OwoColorize;
use uuid::Uuid;

use crate::cli::op::{Op, OpContext};
use magic_folder_daemon::http_server::api::client::ApiError;
use magic_folder_daemon::http_server::api::v1::snapshot::CreateSnapshotRequest;

#[derive(Args, Debug, Clone)]
pub struct Snapshot {
    #[command(flatten)]
    pub request: CreateSnapshotRequest,
}

#[derive(Debug)]
pub struct SnapshotOutput {
    pub folder: String,
    pub path: String,
    pub identifier: Uuid,
}

impl fmt::Display for SnapshotOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} in {} {}",
            "Captured".green().bold(),
            self.path.bold(),
            self.folder,
            self.identifier.to_string().dimmed()
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

#[async_trait::async_trait]
impl Op for Snapshot {
    type Error = SnapshotError;
    type Output = SnapshotOutput;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let response = ctx.client.call(self.request.clone()).await?;

        Ok(SnapshotOutput {
            folder: self.request.folder.clone(),
            path: self.request.path.clone(),
            identifier: response.identifier,
        })
    }
}
