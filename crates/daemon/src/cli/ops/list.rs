use std::fmt;

use clap::Args;
use owo_colors::OwoColorize;

use crate::cli::op::{Op, OpContext};
use magic_folder_daemon::http_server::api::client::ApiError;
use magic_folder_daemon::http_server::api::v1::snapshot::{
    FolderSnapshots, ListAllSnapshotsRequest, ListAllSnapshotsResponse, ListSnapshotsRequest,
};
use magic_folder_daemon::SnapshotSummary;

#[derive(Args, Debug, Clone)]
pub struct List {
    /// Only show this folder
    #[arg(long)]
    pub folder: Option<String>,

    /// Print the raw JSON returned by the daemon
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug)]
pub struct ListOutput {
    pub folders: ListAllSnapshotsResponse,
    pub json: bool,
}

impl fmt::Display for ListOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.json {
            let raw = serde_json::to_string_pretty(&self.folders).map_err(|_| fmt::Error)?;
            return write!(f, "{}", raw);
        }

        if self.folders.is_empty() {
            return write!(f, "{}", "No folders configured".dimmed());
        }

        let mut first = true;
        for (name, paths) in &self.folders {
            if !first {
                writeln!(f)?;
            }
            first = false;
            write_folder(f, name, paths)?;
        }
        Ok(())
    }
}

fn write_folder(f: &mut fmt::Formatter<'_>, name: &str, paths: &FolderSnapshots) -> fmt::Result {
    write!(f, "{}", name.green().bold())?;
    if paths.is_empty() {
        return write!(f, "\n  {}", "no snapshots".dimmed());
    }
    for (relpath, history) in paths {
        write!(f, "\n  {}", relpath.bold())?;
        for entry in history {
            match entry {
                SnapshotSummary::Local {
                    identifier, author, ..
                } => write!(
                    f,
                    "\n    {} {} {}",
                    "local ".yellow(),
                    identifier,
                    author.dimmed()
                )?,
                SnapshotSummary::Remote {
                    capability, author, ..
                } => write!(
                    f,
                    "\n    {} {} {}",
                    "remote".cyan(),
                    capability,
                    author.dimmed()
                )?,
            }
        }
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ListError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

#[async_trait::async_trait]
impl Op for List {
    type Error = ListError;
    type Output = ListOutput;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let folders = match &self.folder {
            Some(folder) => {
                let paths = ctx
                    .client
                    .call(ListSnapshotsRequest {
                        folder: folder.clone(),
                    })
                    .await?;
                ListAllSnapshotsResponse::from([(folder.clone(), paths)])
            }
            None => ctx.client.call(ListAllSnapshotsRequest {}).await?,
        };

        Ok(ListOutput {
            folders,
            json: self.json,
        })
    }
}
