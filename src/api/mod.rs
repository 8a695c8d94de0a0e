//! REST API for health check history and system status
//!
//! ## Architecture
//!
//! - **Axum** web framework with Tower middleware
//! - **Shared state**: the configuration store and the strategy registry
//!
//! ## Endpoints
//!
//! - `GET /api/v1/health` - Health check (never requires auth)
//! - `GET /api/v1/checks/{config_id}/systems/{system_id}/history` - Bucketed history
//! - `GET /api/v1/systems/{system_id}/status` - Reduced system status

#[cfg(feature = "api")]
pub mod error;
#[cfg(feature = "api")]
pub mod middleware;
#[cfg(feature = "api")]
pub mod routes;
#[cfg(feature = "api")]
pub mod state;
#[cfg(feature = "api")]
pub mod types;

#[cfg(feature = "api")]
pub use error::{ApiError, ApiResult};
#[cfg(feature = "api")]
pub use state::ApiState;
#[cfg(feature = "api")]
pub use types::{HealthResponse, HistoryResponse};

#[cfg(feature = "api")]
use axum::{Router, routing::get};
use std::net::{Ipv4Addr, SocketAddr};
#[cfg(feature = "api")]
use tracing::info;

/// API server configuration
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct ApiConfig {
    /// Bind address (e.g., "0.0.0.0:8080")
    #[serde(rename = "bind", default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Optional authentication token
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Enable CORS for dashboards
    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 8080))
}

fn default_enable_cors() -> bool {
    true
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            auth_token: None,
            enable_cors: default_enable_cors(),
        }
    }
}

/// Build the API router with all routes and layers
#[cfg(feature = "api")]
pub fn build_router(config: &ApiConfig, state: ApiState) -> Router {
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::trace::TraceLayer;

    let mut protected = Router::new()
        .route(
            "/api/v1/checks/:config_id/systems/:system_id/history",
            get(routes::history::get_history),
        )
        .route(
            "/api/v1/systems/:system_id/status",
            get(routes::systems::get_system_status),
        );

    // Add auth middleware if token provided
    if let Some(token) = config.auth_token.clone() {
        protected = protected.layer(axum::middleware::from_fn_with_state(
            token,
            middleware::auth::auth_middleware,
        ));
    }

    let mut app = Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .merge(protected)
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    // Add CORS if enabled
    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    app
}

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task.
/// Returns the server's local address.
#[cfg(feature = "api")]
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    info!("starting API server on {}", config.bind_addr);

    let app = build_router(&config, state);

    // Bind and serve
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    // Spawn server in background
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(addr)
}
