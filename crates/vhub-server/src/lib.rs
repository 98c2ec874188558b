//! vhub server - WebSocket front end for the notification hub
//!
//! This crate exposes the hub over HTTP:
//! - `GET /ws` upgrades an authenticated request to a hub connection
//! - `GET /health` reports hub statistics
//! - `POST /api/topics/:topic/publish` lets administrators publish directly

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use config::{Args, ServerConfig};
pub use error::ServerError;
pub use state::AppState;

/// Create the Axum router with all routes
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .merge(routes::health::routes())
        // Operator publish API
        .merge(routes::publish::routes())
        // Hub connections
        .merge(routes::ws::routes())
        // Middleware
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
