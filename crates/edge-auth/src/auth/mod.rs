//! Authentication building blocks for the OIDC flow.
//!
//! - `route_context` - per-request view of a configured route
//! - `nonce` - login nonces
//! - `cookies` - cookie names, attributes and rendering
//! - `policy` - access policy evaluation

pub mod cookies;
pub mod nonce;
pub mod policy;
pub mod route_context;

pub use nonce::Nonce;
pub use policy::{AccessDecision, AccessPolicy, EmailSuffixPolicy, EmailSuffixPolicyFactory, PolicyFactory};
pub use route_context::{RequestOrigin, RouteContext};
