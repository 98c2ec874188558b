//! Admission control for the WebSocket and HTTP routes.
//!
//! Clients present an HS256 JSON Web Token, either in the `Authorization`
//! header or, for browser WebSocket upgrades that cannot set headers, in the
//! `token` query parameter.
//!
//! ```text
//! Authorization: Bearer <jwt>
//! GET /ws?token=<jwt>
//! ```

mod jwt;

pub use jwt::{JwtAuthenticator, JwtClaims, JwtConfig, Principal, ADMIN_ROLE};
