use std::fmt;
use std::path::PathBuf;

use clap::Args;
use owo_colors::OwoColorize;

use magic_folder_daemon::state::{AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct AddFolder {
    /// Name to refer to the folder by
    pub name: String,

    /// Directory to synchronize
    pub path: PathBuf,

    /// Author name attached to snapshots of this folder
    #[arg(long)]
    pub author: String,
}

#[derive(Debug)]
pub struct AddFolderOutput {
    pub name: String,
    pub path: PathBuf,
    pub author: String,
    pub public_key: String,
    pub db_path: PathBuf,
}

impl fmt::Display for AddFolderOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} folder {} at {}",
            "Added".green().bold(),
            self.name.bold(),
            self.path.display()
        )?;
        writeln!(f, "  {} {}", "Author:".dimmed(), self.author)?;
        writeln!(f, "  {} {}", "Public key:".dimmed(), self.public_key)?;
        writeln!(f, "  {} {}", "Index:".dimmed(), self.db_path.display())?;
        write!(
            f,
            "{}",
            "Restart a running daemon to pick up the folder.".dimmed()
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AddFolderError {
    #[error("failed to add folder: {0}")]
    State(#[from] StateError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for AddFolder {
    type Error = AddFolderError;
    type Output = AddFolderOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut state = AppState::load(ctx.config_path.clone())?;
        let paths = state.add_folder(&self.name, &self.path, &self.author)?;
        let author = state.load_author(&self.name)?;

        let path = state
            .config
            .folders
            .get(&self.name)
            .map(|entry| entry.path.clone())
            .unwrap_or_else(|| self.path.clone());

        Ok(AddFolderOutput {
            name: self.name.clone(),
            path,
            author: author.name().to_string(),
            public_key: author.public_key().to_hex(),
            db_path: paths.db_path,
        })
    }
}
