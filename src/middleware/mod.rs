//! Middleware for the Banadama marketplace API
//!
//! Request tracing, rate limiting, security headers, and token-based
//! authentication extractors.

pub mod auth;
mod rate_limiter;
mod security;
mod tracing;

pub use auth::{AdminUser, AuthConfig, AuthenticatedUser};
pub use rate_limiter::{rate_limit_layer, RateLimiter};
pub use security::security_headers;
pub use self::tracing::request_tracing;
