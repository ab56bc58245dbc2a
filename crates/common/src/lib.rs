//! Protocol primitives shared by the edge authentication service and by
//! downstream consumers of its tokens.
//!
//! Nothing in this crate performs I/O. Keys, clocks and tokens are always
//! passed in by the caller, which keeps every check here reproducible in
//! unit tests.

#![warn(clippy::pedantic)]

/// Module for identity claims carried by OIDC ID tokens
pub mod claims;

/// Module for the HMAC-signed capability token ("edge token")
pub mod edge_token;

/// Module for JSON Web Key parsing and key import
pub mod jwk;

/// Module for structural JWT decoding (no trust decision)
pub mod jwt;

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for JWT signature and time-window verification
pub mod verifier;
