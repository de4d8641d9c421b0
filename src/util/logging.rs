// logdex - util/logging.rs
//
// Structured logging with a runtime-selectable level, for host applications
// (CLIs, services) that embed this crate and want consistent diagnostics
// from the indexer.
//
// Activation:
//   - Environment variable: RUST_LOG=debug (or trace)
//   - Explicit level argument passed by the host application
//
// Output: stderr. Never logs full line contents at any level above TRACE,
// to avoid flooding diagnostics with arbitrary log file content.

use tracing_subscriber::EnvFilter;

/// Initialise the logging subsystem.
///
/// `explicit_level` is a level the host application wants to force (e.g.
/// from its own `--debug` flag or config file).
///
/// Priority: `RUST_LOG` env var > `explicit_level` > default "info".
pub fn init(explicit_level: Option<&str>) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if let Some(level) = explicit_level {
        EnvFilter::new(level)
    } else {
        EnvFilter::new(super::constants::DEFAULT_LOG_LEVEL)
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .compact()
        .init();

    tracing::debug!(version = super::constants::CRATE_VERSION, "logging initialised");
}
