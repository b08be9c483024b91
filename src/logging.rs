//! Logging setup, trimmed down from `io-engine`'s `logger.rs`: same
//! `tracing` + `tracing-subscriber` + `tracing-log` stack (bridging `log`
//! macros emitted by third-party crates such as `nix`), minus the SPDK log
//! bridge and the multi-style JSON/compact formatters, since there is no
//! SPDK here and a single human-readable format is all the ambient stack
//! needs.

use std::io::IsTerminal;

use tracing_log::LogTracer;
use tracing_subscriber::{fmt, EnvFilter};

/// Initializes the global tracing subscriber. `directives` follows the
/// usual `RUST_LOG`-style syntax, e.g. `"dm_engine=debug"`.
///
/// Safe to call more than once; subsequent calls are no-ops.
pub fn init(directives: &str) {
    let _ = LogTracer::init();

    let filter = EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_ansi(std::io::stdout().is_terminal())
        .with_target(true)
        .try_init();
}
