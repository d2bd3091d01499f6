//! HTTP boundary for the WoT gateway
//!
//! Translates HTTP calls into thing envelopes, hands them to the manager and
//! turns the replies back into HTTP responses.

pub mod health;
pub mod rate_limit;
mod reply;
pub mod things;

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::Result;
use crate::manager::ThingManager;

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub manager: Arc<ThingManager>,
    pub rate_limiter: Option<rate_limit::SharedLimiter>,
}

/// Build the full gateway router
pub fn router(state: Arc<ApiState>) -> Router {
    let router = Router::new()
        .merge(things::router(state.clone()))
        .merge(health::router())
        .merge(health::ready_router(state.clone()))
        .layer(axum::middleware::from_fn_with_state(
            state,
            rate_limit::rate_limit_middleware,
        ));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    router.layer(cors).layer(TraceLayer::new_for_http())
}

/// HTTP API server
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
}

impl ApiServer {
    /// Create a server in front of a manager
    #[must_use]
    pub fn new(manager: Arc<ThingManager>, port: u16) -> Self {
        Self {
            state: Arc::new(ApiState {
                manager,
                rate_limiter: None,
            }),
            port,
        }
    }

    /// Cap the global request rate
    #[must_use]
    pub fn rate_limit(mut self, requests_per_minute: Option<u32>) -> Self {
        let limiter = requests_per_minute.map(rate_limit::create_limiter);
        if let Some(state) = Arc::get_mut(&mut self.state) {
            state.rate_limiter = limiter;
        }
        self
    }

    /// Router serving this server's state
    #[must_use]
    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Run the API server until `shutdown` resolves
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(port = self.port, "API server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }

    /// Run the API server in a background task
    #[must_use]
    pub fn spawn<F>(self, shutdown: F) -> tokio::task::JoinHandle<Result<()>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(async move { self.run(shutdown).await })
    }
}
