//! Server configuration.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

use vhub_core::config::{
    DEFAULT_OUTBOX_CAPACITY, DEFAULT_PING_INTERVAL_SECS, DEFAULT_PONG_WAIT_SECS,
    DEFAULT_WRITE_TIMEOUT_SECS,
};
use vhub_core::{HubConfig, PumpConfig};

use crate::error::{Result, ServerError};

/// Default listen address.
pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0:8080";

/// Default maximum size of an inbound WebSocket message.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 4096;

/// Default clock skew tolerated when checking token expiry.
pub const DEFAULT_JWT_LEEWAY_SECS: u64 = 60;

/// Environment variable holding the JWT secret when `--jwt-secret` is absent.
pub const JWT_SECRET_ENV: &str = "VHUB_JWT_SECRET";

/// Command-line arguments for the server.
#[derive(Parser, Debug)]
#[command(name = "vhub-server")]
#[command(version, about = "Real-time notification hub", long_about = None)]
pub struct Args {
    /// Address to listen on.
    #[arg(long, default_value = DEFAULT_LISTEN_ADDRESS)]
    pub listen: String,

    /// Per-connection outbox capacity. A subscriber that falls this far
    /// behind is disconnected.
    #[arg(long, default_value_t = DEFAULT_OUTBOX_CAPACITY)]
    pub outbox_capacity: usize,

    /// Time allowed for a single write, in seconds.
    #[arg(long, default_value_t = DEFAULT_WRITE_TIMEOUT_SECS)]
    pub write_timeout_secs: u64,

    /// Time allowed between two inbound frames, in seconds.
    #[arg(long, default_value_t = DEFAULT_PONG_WAIT_SECS)]
    pub pong_wait_secs: u64,

    /// Interval between keepalive pings, in seconds. Set to 0 to disable.
    #[arg(long, default_value_t = DEFAULT_PING_INTERVAL_SECS)]
    pub ping_interval_secs: u64,

    /// Maximum inbound WebSocket message size in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_FRAME_BYTES)]
    pub max_frame_bytes: usize,

    /// HMAC secret used to verify client tokens (defaults to $VHUB_JWT_SECRET).
    #[arg(long)]
    pub jwt_secret: Option<String>,

    /// Clock skew tolerated when checking token expiry, in seconds.
    #[arg(long, default_value_t = DEFAULT_JWT_LEEWAY_SECS)]
    pub jwt_leeway_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Convert command-line arguments to server configuration.
    pub fn into_config(self) -> Result<ServerConfig> {
        let listen: SocketAddr = self
            .listen
            .parse()
            .map_err(|e| ServerError::Config(format!("invalid listen address {}: {}", self.listen, e)))?;

        let jwt_secret = self
            .jwt_secret
            .or_else(|| std::env::var(JWT_SECRET_ENV).ok())
            .filter(|secret| !secret.is_empty())
            .ok_or_else(|| {
                ServerError::Config(format!("no JWT secret configured (set {})", JWT_SECRET_ENV))
            })?;

        let mut pump = PumpConfig::new()
            .with_write_timeout(Duration::from_secs(self.write_timeout_secs))
            .with_pong_wait(Duration::from_secs(self.pong_wait_secs));
        pump = if self.ping_interval_secs == 0 {
            pump.without_ping()
        } else {
            pump.with_ping_interval(Duration::from_secs(self.ping_interval_secs))
        };

        let config = ServerConfig {
            listen,
            hub: HubConfig::new().with_outbox_capacity(self.outbox_capacity),
            pump,
            max_frame_bytes: self.max_frame_bytes,
            jwt_secret,
            jwt_leeway_secs: self.jwt_leeway_secs,
        };
        config.validate()?;

        Ok(config)
    }
}

/// vhub server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Address to listen on.
    pub listen: SocketAddr,

    /// Hub settings.
    pub hub: HubConfig,

    /// Per-connection pump timings.
    pub pump: PumpConfig,

    /// Maximum inbound WebSocket message size in bytes.
    pub max_frame_bytes: usize,

    /// HMAC secret for token verification.
    pub jwt_secret: String,

    /// Clock skew tolerated when checking token expiry, in seconds.
    pub jwt_leeway_secs: u64,
}

impl ServerConfig {
    /// Create a configuration with default values and the given JWT secret.
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            hub: HubConfig::default(),
            pump: PumpConfig::default(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            jwt_secret: jwt_secret.into(),
            jwt_leeway_secs: DEFAULT_JWT_LEEWAY_SECS,
        }
    }

    /// Set the listen address.
    pub fn with_listen(mut self, listen: SocketAddr) -> Self {
        self.listen = listen;
        self
    }

    /// Set the pump configuration.
    pub fn with_pump(mut self, pump: PumpConfig) -> Self {
        self.pump = pump;
        self
    }

    /// Reject timings that would drop healthy connections.
    pub fn validate(&self) -> Result<()> {
        if self.pump.write_timeout.is_zero() {
            return Err(ServerError::Config("write timeout must be positive".into()));
        }
        if self.pump.pong_wait.is_zero() {
            return Err(ServerError::Config("pong wait must be positive".into()));
        }
        if !self.pump.is_consistent() {
            return Err(ServerError::Config(
                "ping interval must be shorter than pong wait".into(),
            ));
        }
        if self.max_frame_bytes == 0 {
            return Err(ServerError::Config("max frame size must be positive".into()));
        }
        Ok(())
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("listen", &self.listen)
            .field("hub", &self.hub)
            .field("pump", &self.pump)
            .field("max_frame_bytes", &self.max_frame_bytes)
            .field("jwt_secret", &"<redacted>")
            .field("jwt_leeway_secs", &self.jwt_leeway_secs)
            .finish()
    }
}
