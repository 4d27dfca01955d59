use clap::Args;

use magic_folder_daemon::state::{AppState, StateError};
use magic_folder_daemon::spawn_service;

#[derive(Args, Debug, Clone)]
pub struct Run {}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("daemon failed: {0:#}")]
    Failed(anyhow::Error),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Run {
    type Error = RunError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let config = state.service_config()?;

        tracing::info!(
            folders = config.folders.len(),
            api = %config.api_listen_addr,
            "starting daemon"
        );
        spawn_service(&config).await.map_err(RunError::Failed)?;
        Ok("daemon stopped".to_string())
    }
}
