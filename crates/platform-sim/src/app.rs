//! Daemon wiring: engine construction, API server task and signal handling

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::ApiServer;
use crate::config::load_users;
use crate::config::DaemonArgs;
use crate::config::EngineConfig;
use crate::domain::types::User;
use crate::domain::PlatformEngine;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Application {
    engine: Arc<PlatformEngine>,
    daemon_args: DaemonArgs,
    cancellation_token: CancellationToken,
}

impl Application {
    /// Builds the engine from daemon arguments, loading extra users and
    /// seeding demo data when requested
    pub async fn build(daemon_args: DaemonArgs) -> Result<Self> {
        let mut config = EngineConfig::from(&daemon_args);
        if let Some(path) = &daemon_args.users_file {
            let users = load_users(path)
                .map_err(|report| anyhow::anyhow!("{report:?}"))
                .with_context(|| format!("loading users from {}", path.display()))?;
            tracing::info!(count = users.len(), "Loaded users file");
            config = config
                .with_users(users)
                .map_err(|report| anyhow::anyhow!("{report:?}"))
                .with_context(|| format!("registering users from {}", path.display()))?;
        }

        let engine = Arc::new(PlatformEngine::new(config));
        if daemon_args.seed_demo_data {
            engine
                .seed_demo_data(&User::default_test_user().user_id)
                .await
                .context("seeding demo data")?;
        }

        Ok(Self {
            engine,
            daemon_args,
            cancellation_token: CancellationToken::new(),
        })
    }

    /// Serves the API until a shutdown signal arrives or the server stops
    pub async fn run(&self) -> Result<()> {
        let mut api_server_task = self.spawn_api_server_task();

        tokio::select! {
            signal = wait_for_signal() => {
                signal?;
                tracing::info!("Shutdown signal received, stopping API server");
                self.cancellation_token.cancel();
                match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut api_server_task).await {
                    Ok(Err(e)) => tracing::error!("API server task failed during shutdown: {e}"),
                    Err(_) => tracing::warn!("API server shutdown timed out after {:?}", SHUTDOWN_TIMEOUT),
                    Ok(Ok(())) => {}
                }
            }
            result = &mut api_server_task => {
                result.context("API server task panicked")?;
                anyhow::bail!("API server stopped unexpectedly");
            }
        }

        Ok(())
    }

    fn spawn_api_server_task(&self) -> JoinHandle<()> {
        let server = ApiServer::new(
            Arc::clone(&self.engine),
            self.daemon_args.api_listen_addr.clone(),
        );
        let token = self.cancellation_token.clone();
        tokio::spawn(async move {
            if let Err(e) = server.run(token).await {
                tracing::error!("API server error: {e:?}");
            }
        })
    }

    /// Stops every lifecycle task still in flight
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Shutting down application...");
        self.cancellation_token.cancel();
        self.engine.shutdown().await;
        tracing::info!("Application shutdown completed");
        Ok(())
    }
}

async fn wait_for_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::signal;
        use tokio::signal::unix::SignalKind;

        let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
        let mut sigint = signal(SignalKind::interrupt()).context("installing SIGINT handler")?;
        tokio::select! {
            _ = sigterm.recv() => tracing::info!("Received SIGTERM, initiating graceful shutdown"),
            _ = sigint.recv() => tracing::info!("Received SIGINT, initiating graceful shutdown"),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("installing Ctrl+C handler")?;
        tracing::info!("Received Ctrl+C, initiating graceful shutdown");
    }
    Ok(())
}
