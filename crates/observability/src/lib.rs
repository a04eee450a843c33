//! Process-wide tracing setup shared by the server binary and tests.

/// Initialize process-wide observability from the environment.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(tracing::TracingConfig::from_env());
}

/// Tracing configuration (filters, output format).
pub mod tracing;
