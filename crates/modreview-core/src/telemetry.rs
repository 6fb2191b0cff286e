//! Centralised tracing initialisation for ModReview binaries.
//!
//! Call [`init_tracing`] once at program start. Later calls are ignored;
//! the global subscriber can only be set once per process.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const CRATES: [&str; 4] = [
    "modreview_core",
    "modreview_transport",
    "modreview_api",
    "modreview",
];

/// Filter used when `RUST_LOG` is unset: `level` for our own crates,
/// `warn` for socket and HTTP dependencies.
pub fn default_filter(level: Level) -> String {
    let mut directives = vec!["warn".to_string()];
    directives.extend(CRATES.iter().map(|krate| format!("{krate}={level}")));
    directives.join(",").to_lowercase()
}

/// Initialise the global tracing subscriber.
///
/// * `json`: emit newline-delimited JSON log lines on stdout.
/// * `level`: verbosity for ModReview crates when `RUST_LOG` is not set.
///
/// Human-readable output goes to stderr so command output stays pipeable.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(level)));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).json())
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
