//! # Curio API Server
//!
//! REST API over the curated feed and its resolvers, consumed by the
//! presentation layer.
//!
//! ## Endpoints
//!
//! - `GET /api/v1/feed` - Current feed snapshot
//! - `POST /api/v1/feed/more` - Load the next window
//! - `POST /api/v1/feed/retry` - Drain the failure queue if due
//! - `GET /api/v1/feed/search?q=` - Filter displayed items
//! - `POST /api/v1/feed/artist?q=` - Load unloaded items by one artist
//! - `GET /api/v1/identity/:address` - Resolve a display name
//! - `POST /api/v1/identity/batch` - Resolve many display names
//! - `GET /api/v1/owner/:contract` - Resolve a contract's author
//! - `GET /api/v1/allowlist/:address` - Check allowlist membership
//! - `GET /api/v1/share/:contract/:item` - Build a share action
//!
//! ## Example
//!
//! ```rust,ignore
//! use curio_api::{ApiConfig, ApiServer, AppState};
//!
//! let state = AppState::from_config(ApiConfig::from_env()).await?;
//! ApiServer::new(state).run(([0, 0, 0, 0], 3001)).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod routes;
mod handlers;
mod state;
mod dto;
mod error;

pub use routes::create_router;
pub use state::{AppState, ApiConfig, StaticAllowlist};
pub use error::ApiError;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use curio_feed::FeedHandle;

/// API server for the feed.
pub struct ApiServer {
    state: Arc<AppState>,
}

impl ApiServer {
    /// Creates a new API server over the given state.
    pub fn new(state: AppState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    /// Creates the router with all routes configured.
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        create_router(self.state.clone())
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Runs the server on the given address.
    ///
    /// The feed is driven in the background for as long as the server runs.
    pub async fn run(self, addr: impl Into<SocketAddr>) -> std::io::Result<()> {
        let addr = addr.into();
        let listener = tokio::net::TcpListener::bind(addr).await?;

        let driver = FeedHandle::spawn(Arc::clone(&self.state.feed));
        info!("Curio API server listening on {}", addr);

        let served = axum::serve(listener, self.router()).await;
        driver.shutdown().await;
        served
    }
}

/// Starts the API server with configuration from the environment.
pub async fn start_server(port: u16) -> std::io::Result<()> {
    let state = AppState::from_config(ApiConfig::from_env())
        .await
        .map_err(std::io::Error::other)?;
    ApiServer::new(state).run(([0, 0, 0, 0], port)).await
}
