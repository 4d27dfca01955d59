use std::fmt;
use std::path::PathBuf;

use clap::Args;
use owo_colors::OwoColorize;
use url::Url;

use magic_folder_daemon::state::{AppConfig, AppState, StateError};
use magic_folder_daemon::DuplicatePolicy;

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Control API listen address
    #[arg(long, default_value = "127.0.0.1:5050")]
    pub api_listen_addr: String,

    /// Storage grid web API (omit to use an in-memory grid)
    #[arg(long)]
    pub grid_url: Option<Url>,

    /// Captures that may run at once, across all folders
    #[arg(long, default_value_t = 4)]
    pub max_workers: usize,

    /// What to do with a capture request for a path already being captured
    /// (queue or coalesce)
    #[arg(long, default_value_t = DuplicatePolicy::Queue)]
    pub duplicate_policy: DuplicatePolicy,
}

#[derive(Debug)]
pub struct InitOutput {
    pub app_dir: PathBuf,
    pub config_path: PathBuf,
    pub api_listen_addr: String,
    pub grid_url: Option<Url>,
    pub duplicate_policy: DuplicatePolicy,
}

impl fmt::Display for InitOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} magic-folder at {}",
            "Initialized".green().bold(),
            self.app_dir.display().to_string().bold()
        )?;
        writeln!(f, "  {} {}", "Config:".dimmed(), self.config_path.display())?;
        writeln!(f, "  {} {}", "API:".dimmed(), self.api_listen_addr)?;
        let grid = match &self.grid_url {
            Some(url) => url.to_string(),
            None => "in-memory".to_string(),
        };
        writeln!(f, "  {} {}", "Grid:".dimmed(), grid)?;
        write!(f, "  {} {}", "Duplicates:".dimmed(), self.duplicate_policy)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] StateError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = InitError;
    type Output = InitOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let config = AppConfig {
            api_listen_addr: self.api_listen_addr.clone(),
            grid_url: self.grid_url.clone(),
            max_workers: self.max_workers,
            duplicate_policy: self.duplicate_policy,
            ..AppConfig::default()
        };

        let state = AppState::init(ctx.config_path.clone(), Some(config))?;
        // fail now rather than at `run`
        state.service_config()?;

        Ok(InitOutput {
            app_dir: state.app_dir,
            config_path: state.config_path,
            api_listen_addr: state.config.api_listen_addr,
            grid_url: state.config.grid_url,
            duplicate_policy: state.config.duplicate_policy,
        })
    }
}
