//! Process-wide tracing setup. Domain-level logging and metrics have their
//! own crates (`sagaflow-log`, `sagaflow-metrics`); this crate only
//! configures the `tracing` subscriber those bridge into.

/// Initialize process-wide tracing.
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Tracing configuration (filters, layers).
pub mod tracing;
