use std::sync::Arc;

use error_stack::Report;
use poem::get;
use poem::listener::TcpListener;
use poem::middleware::Tracing;
use poem::post;
use poem::Endpoint;
use poem::EndpointExt;
use poem::Route;
use poem::Server;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;

use super::auth::BearerAuthMiddleware;
use super::errors::ApiError;
use super::handlers;
use crate::domain::PlatformEngine;

/// Builds the full route table around `engine`
pub fn routes(engine: Arc<PlatformEngine>) -> impl Endpoint {
    let auth = BearerAuthMiddleware::new(Arc::clone(&engine));

    Route::new()
        .at("/health", get(handlers::health))
        .at("/api/v1/auth/login", post(handlers::login))
        .at("/api/v1/auth/verify", get(handlers::verify))
        .at(
            "/api/v1/gpu/instances",
            get(handlers::list_instances)
                .post(handlers::create_instance)
                .with(auth.clone()),
        )
        .at(
            "/api/v1/gpu/instances/:instance_id",
            get(handlers::get_instance)
                .delete(handlers::delete_instance)
                .with(auth.clone()),
        )
        .at("/api/v1/jobs", post(handlers::submit_job).with(auth.clone()))
        .at("/api/v1/jobs/:job_id", get(handlers::get_job).with(auth.clone()))
        .at("/api/v1/metrics", get(handlers::query_metrics).with(auth))
        .data(engine)
        .with(Tracing)
}

/// HTTP front end of the platform engine
pub struct ApiServer {
    engine: Arc<PlatformEngine>,
    listen_addr: String,
}

impl ApiServer {
    pub fn new(engine: Arc<PlatformEngine>, listen_addr: String) -> Self {
        Self {
            engine,
            listen_addr,
        }
    }

    /// Serves until `shutdown` is cancelled
    ///
    /// # Errors
    ///
    /// - [`ApiError::ServerError`] if the server fails to bind or stops abnormally
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), Report<ApiError>> {
        info!("Starting HTTP API server on {}", self.listen_addr);

        let app = routes(self.engine);
        let listener = TcpListener::bind(&self.listen_addr);
        let server = Server::new(listener);

        tokio::select! {
            result = server.run(app) => {
                match result {
                    Ok(()) => {
                        info!("API server stopped normally");
                        Ok(())
                    }
                    Err(e) => {
                        error!("API server failed: {e}");
                        Err(Report::new(ApiError::ServerError {
                            message: format!("Server failed: {e}"),
                        }))
                    }
                }
            }
            _ = shutdown.cancelled() => {
                info!("API server shutdown requested");
                Ok(())
            }
        }
    }
}
