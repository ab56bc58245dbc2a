//! Observability for the edge auth service.

pub mod metrics;
