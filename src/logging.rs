//! Diagnostic logging setup.
//!
//! Logs go to stderr so stdout stays parseable (`--json`, tables).

use tracing_subscriber::EnvFilter;

/// Environment variable consulted before `RUST_LOG`.
pub const LOG_ENV: &str = "MEMIDX_LOG";

/// Choose the filter directive: `MEMIDX_LOG`, then `RUST_LOG`, then the
/// `--verbose` flag.
pub fn filter_directive(memidx_log: Option<String>, rust_log: Option<String>, verbose: bool) -> String {
    memidx_log
        .filter(|s| !s.trim().is_empty())
        .or_else(|| rust_log.filter(|s| !s.trim().is_empty()))
        .unwrap_or_else(|| if verbose { "debug" } else { "warn" }.to_string())
}

pub fn init_logging(verbose: bool) {
    let directive = filter_directive(
        std::env::var(LOG_ENV).ok(),
        std::env::var("RUST_LOG").ok(),
        verbose,
    );
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("warn"));

    // Ignore error if a subscriber is already set (e.g. in tests).
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
