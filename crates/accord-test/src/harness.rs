//! Test harness helpers.

use tracing_subscriber::EnvFilter;

/// Route `tracing` output to the test writer, filtered by `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
