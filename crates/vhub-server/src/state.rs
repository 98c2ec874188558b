use std::sync::Arc;

use vhub_core::Hub;

use crate::auth::JwtAuthenticator;
use crate::config::ServerConfig;

/// Application state shared across all routes
#[derive(Clone)]
pub struct AppState {
    pub hub: Hub,
    pub auth: Arc<JwtAuthenticator>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(hub: Hub, config: ServerConfig) -> Self {
        Self {
            hub,
            auth: Arc::new(
                JwtAuthenticator::with_secret_str(&config.jwt_secret)
                    .with_leeway(config.jwt_leeway_secs),
            ),
            config: Arc::new(config),
        }
    }
}
