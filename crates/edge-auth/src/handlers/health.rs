//! Liveness probe.

/// Returns "OK" while the process is serving requests. No dependencies are
/// checked.
pub async fn health_check() -> &'static str {
    "OK"
}
