//! Process-wide tracing/logging setup shared by the binaries.

/// Tracing configuration (filters, output format).
pub mod tracing;

/// Initialize process-wide tracing/logging.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init();
}
