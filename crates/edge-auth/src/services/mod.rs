//! Outbound clients.
//!
//! - `idp_client` - authorization code exchange at the IdP token endpoint
//! - `jwks_client` - JWKS fetching, caching and rotation-aware verification

pub mod idp_client;
pub mod jwks_client;

pub use idp_client::{IdpClient, TokenExchangeError, TokenResponse, UpstreamErrorBody};
pub use jwks_client::JwksClient;
