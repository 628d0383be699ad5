//! HTTP API server for charvoice

pub mod health;
pub mod tts;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::Result;
use crate::synthesis::SynthesisService;

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub synthesis: Arc<SynthesisService>,
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    addr: SocketAddr,
}

impl ApiServer {
    #[must_use]
    pub fn new(synthesis: Arc<SynthesisService>, addr: SocketAddr) -> Self {
        Self {
            state: Arc::new(ApiState { synthesis }),
            addr,
        }
    }

    /// Build the router with all routes
    pub fn router(&self) -> Router {
        router(Arc::clone(&self.state))
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(addr = %self.addr, "API server listening");

        axum::serve(listener, self.router())
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }

    /// Run the API server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}

/// Routes for a given state, with CORS and request tracing
pub fn router(state: Arc<ApiState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api/tts", tts::router(Arc::clone(&state)))
        .merge(health::router(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
