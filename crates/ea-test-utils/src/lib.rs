//! # Edge Auth Test Utilities
//!
//! Shared test utilities for the edge auth service.
//!
//! This crate provides:
//! - Deterministic signing keys and their JWKs (`crypto_fixtures`)
//! - ID token claim builders (`token_builders`)
//! - A wiremock identity provider with token and JWKS endpoints (`mock_idp`)
//! - Server test harness (`TestEdgeServer` for E2E tests)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ea_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let idp = MockIdp::start().await;
//!     let server = TestEdgeServer::spawn(test_vars(&idp)).await?;
//!
//!     let response = reqwest::get(format!("{}/health", server.url())).await?;
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod crypto_fixtures;
pub mod mock_idp;
pub mod server_harness;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use mock_idp::*;
pub use server_harness::*;
pub use token_builders::*;
