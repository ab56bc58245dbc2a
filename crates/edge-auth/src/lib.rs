//! Edge Auth Service Library
//!
//! Authenticates end users at the edge with the OpenID Connect
//! authorization-code flow and turns the resulting identity into a
//! short-lived HMAC capability token (the `__token__` cookie) that
//! downstream edge logic checks without a session store. A second surface
//! guards requests by verifying a JWT against a JWKS.
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> handlers/*.rs -> services/*.rs
//!                \-> middleware/jwt_guard.rs -> services/jwks_client.rs
//! ```
//!
//! Token formats, JWT decoding and signature verification live in the
//! `common` crate and perform no I/O.
//!
//! # Modules
//!
//! - `auth` - route context, nonces, cookies, access policy
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - JWT guard and HTTP metrics
//! - `observability` - Prometheus metrics
//! - `routes` - Axum router setup
//! - `services` - IdP token endpoint and JWKS clients

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod routes;
pub mod services;
