//! Service lifecycle: start, run until interrupted, shut down in order

use std::net::SocketAddr;

use anyhow::Context;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::http_server;
use crate::service_config::Config;
use crate::service_state::State as ServiceState;

/// Handle to a running service
pub struct ShutdownHandle {
    state: ServiceState,
    shutdown_tx: watch::Sender<()>,
    shutdown_rx: watch::Receiver<()>,
    handles: Vec<JoinHandle<()>>,
    api_addr: SocketAddr,
}

impl ShutdownHandle {
    /// Address the control API actually bound to
    pub fn api_addr(&self) -> SocketAddr {
        self.api_addr
    }

    /// Ask the service to stop; [`ShutdownHandle::wait`] returns once it has
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Wait for a shutdown request, then drain captures and join every task
    pub async fn wait(mut self) {
        let _ = self.shutdown_rx.changed().await;
        tracing::info!("shutting down");

        self.state.stop().await;
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "service task ended abnormally");
            }
        }
        tracing::info!("service stopped");
    }
}

/// Open all folders, start upload workers and serve the control API
pub async fn start_service(config: &Config) -> anyhow::Result<(ServiceState, ShutdownHandle)> {
    let (shutdown_tx, shutdown_rx) = watch::channel(());

    let (state, mut handles) = ServiceState::from_config(config, shutdown_rx.clone())
        .await
        .context("failed to set up service state")?;

    let listener = tokio::net::TcpListener::bind(config.api_listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.api_listen_addr))?;
    let api_addr = listener.local_addr()?;
    tracing::info!(addr = %api_addr, "control API listening");

    let app = http_server::router(state.clone());
    let mut server_shutdown = shutdown_rx.clone();
    handles.push(tokio::spawn(async move {
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.changed().await;
            })
            .await;
        if let Err(e) = served {
            tracing::error!(error = %e, "control API server failed");
        }
    }));

    let handle = ShutdownHandle {
        state: state.clone(),
        shutdown_tx,
        shutdown_rx,
        handles,
        api_addr,
    };
    Ok((state, handle))
}

/// Run the service until ctrl-c
pub async fn spawn_service(config: &Config) -> anyhow::Result<()> {
    let (_state, handle) = start_service(config).await?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    handle.shutdown();
    handle.wait().await;
    Ok(())
}
