//! Process-wide tracing/logging setup for shelfsync binaries.

/// Initialize tracing/logging with settings from the environment.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init(tracing::LogConfig::from_env());
}

/// Tracing configuration (filters, formats).
pub mod tracing;
