//! Diagnostic logging for the `skylift` binary.
//!
//! A test run has two audiences. Per-file reports and the run summary are
//! written to stdout through a report sink and are what a user or CI job
//! reads. Lifecycle events from `obs`, such as a file being retried,
//! are diagnostics and go to stderr, so piping stdout to a file
//! captures only the report.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the stderr subscriber for diagnostics.
///
/// `RUST_LOG` wins over `level` when set. With `json`, each event is one
/// JSON object per line, which keeps the stable `event` field from `obs`
/// machine-readable. Only the first call in a process installs anything.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
            .ok();
    }
}

/// `--debug`/`DEBUG` also surfaces per-resource events, which log at debug.
pub fn level_for(debug: bool) -> Level {
    if debug {
        Level::DEBUG
    } else {
        Level::INFO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_twice_is_harmless() {
        init_tracing(false, Level::WARN);
        init_tracing(true, Level::DEBUG);
    }

    #[test]
    fn test_level_for() {
        assert_eq!(level_for(true), Level::DEBUG);
        assert_eq!(level_for(false), Level::INFO);
    }
}
