//! Logging initialization shared by refetch binaries.

use tracing_subscriber::EnvFilter;

/// Initialize tracing output.
///
/// When `quiet` is true no subscriber is installed and logging is a no-op.
/// Otherwise structured JSON logs go to stderr, filtered by `RUST_LOG`
/// (default `info`). Safe to call more than once; later calls are ignored.
pub fn init_logging(quiet: bool) {
    if quiet {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
