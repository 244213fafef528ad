//! Log subscriber setup for the `replay-verify` binary.
//!
//! Logs go to stderr so stdout carries only the run summary and plan output.
//! `--json` switches to newline-delimited JSON for CI log collectors and
//! `--verbose` lowers the default level to DEBUG. `RUST_LOG` overrides both
//! levels when set.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter honouring `RUST_LOG`, falling back to `level`.
fn log_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init_tracing(json: bool, level: Level) {
    let base = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry().with(log_filter(level));

    let installed = if json {
        registry.with(base.json().flatten_event(true)).try_init()
    } else {
        registry.with(base.compact()).try_init()
    };
    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}
