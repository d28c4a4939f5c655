//! Tracing/logging setup shared by the linkpeek binaries.

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use crate::tracing::LogFormat;

/// Initialize process-wide logging with a fallback filter directive
/// (typically the configured `LOG_LEVEL`).
pub fn init_with_default(default_directive: &str) {
    tracing::init_with_default(default_directive);
}
