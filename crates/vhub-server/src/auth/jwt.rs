//! JWT (JSON Web Token) based authentication.
//!
//! Tokens are signed with a shared HMAC secret (HS256) by the identity
//! service; this server only verifies them.
//!
//! # JWT Claims
//!
//! The JWT must contain:
//! - `user_id`: Numeric user identifier
//! - `role`: Role name (`admin`, `volunteer`, `organization`)
//! - `exp`: Expiration timestamp (Unix timestamp)
//!
//! Optional claims:
//! - `iat`: Issued at timestamp
//!
//! # Example JWT Payload
//!
//! ```json
//! {
//!   "user_id": 42,
//!   "role": "volunteer",
//!   "exp": 1735689600,
//!   "iat": 1735603200
//! }
//! ```

use axum::http::{header, HeaderMap};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use vhub_core::UserId;

use crate::error::{Result, ServerError};

/// Role allowed to publish through the HTTP API.
pub const ADMIN_ROLE: &str = "admin";

/// JWT claims structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// User identifier.
    pub user_id: i64,

    /// Role name.
    pub role: String,

    /// Expiration time (Unix timestamp).
    pub exp: u64,

    /// Issued at time (Unix timestamp).
    #[serde(default)]
    pub iat: Option<u64>,
}

/// The verified identity behind a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub role: String,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }
}

impl From<JwtClaims> for Principal {
    fn from(claims: JwtClaims) -> Self {
        Self {
            user_id: UserId(claims.user_id),
            role: claims.role,
        }
    }
}

/// JWT authenticator configuration.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Whether to validate expiration.
    pub validate_exp: bool,

    /// Leeway in seconds for expiration check.
    pub leeway_secs: u64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            validate_exp: true,
            leeway_secs: 60,
        }
    }
}

/// Verifies HS256 tokens and turns them into a [`Principal`].
pub struct JwtAuthenticator {
    decoding_key: DecodingKey,
    config: JwtConfig,
}

impl JwtAuthenticator {
    /// Create a new JWT authenticator with HMAC secret.
    pub fn with_secret(secret: &[u8]) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret),
            config: JwtConfig::default(),
        }
    }

    /// Create a new JWT authenticator with HMAC secret string.
    pub fn with_secret_str(secret: &str) -> Self {
        Self::with_secret(secret.as_bytes())
    }

    /// Set the leeway for expiration check.
    pub fn with_leeway(mut self, secs: u64) -> Self {
        self.config.leeway_secs = secs;
        self
    }

    /// Disable expiration validation (not recommended for production).
    pub fn without_exp_validation(mut self) -> Self {
        self.config.validate_exp = false;
        self
    }

    /// Verify a JWT token and extract claims.
    pub fn verify_token(&self, token: &str) -> Result<JwtClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = self.config.leeway_secs;
        validation.validate_exp = self.config.validate_exp;

        let token_data = decode::<JwtClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| ServerError::Unauthorized(format!("JWT verification failed: {}", e)))?;

        Ok(token_data.claims)
    }

    /// Authenticate a request from its `Authorization` header, falling back
    /// to a token passed as query parameter.
    pub fn authenticate(&self, headers: &HeaderMap, query_token: Option<&str>) -> Result<Principal> {
        let token = match headers.get(header::AUTHORIZATION) {
            Some(value) => {
                let value = value.to_str().map_err(|_| {
                    ServerError::Unauthorized("malformed authorization header".to_string())
                })?;
                value
                    .strip_prefix("Bearer ")
                    .or_else(|| value.strip_prefix("bearer "))
                    .ok_or_else(|| {
                        ServerError::Unauthorized("invalid authorization format".to_string())
                    })?
            }
            None => query_token
                .filter(|token| !token.is_empty())
                .ok_or_else(|| ServerError::Unauthorized("missing token".to_string()))?,
        };

        self.verify_token(token.trim()).map(Principal::from)
    }
}
