//! HTTP service for the JinGPT document assistant.
//!
//! Serves `/api/chat` (JSON or Server-Sent Events), the Atlassian OAuth
//! routes used to connect Confluence, and a health check.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use jingpt_client::AnthropicClient;
//! use jingpt_server::{AppState, Server, ServerConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ServerConfig::default();
//! let llm = Arc::new(AnthropicClient::new(config.client_config(|k| std::env::var(k).ok())?)?);
//!
//! let server = Server::new(AppState::new(config, llm, reqwest::Client::new()));
//! server.run(std::future::pending()).await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::{AtlassianApp, ServerConfig};
pub use error::{Result, ServerError};
pub use state::AppState;

use std::future::Future;

use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// The JinGPT HTTP server.
pub struct Server {
    state: AppState,
}

impl Server {
    #[must_use]
    pub const fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Build the router with all routes and middleware.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(routes::health))
            .nest("/api", Self::api_routes())
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    fn api_routes() -> Router<AppState> {
        Router::new()
            .route("/chat", post(routes::chat))
            .route("/auth/atlassian", get(routes::auth::authorize))
            .route("/auth/atlassian/callback", get(routes::auth::callback))
            .route("/auth/atlassian/status", get(routes::auth::status))
            .route("/auth/logout", post(routes::auth::logout))
    }

    /// Serves until `shutdown` resolves, then drains open connections.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot bind or the server fails.
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let addr = self.state.config.bind;
        let router = self.router();

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Internal(format!("Failed to bind {addr}: {e}")))?;

        info!("Listening on {addr}");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}

fn panic_response(
    _panic: Box<dyn std::any::Any + Send + 'static>,
) -> axum::response::Response {
    use axum::response::IntoResponse;

    ServerError::Internal("handler panicked".to_string()).into_response()
}
