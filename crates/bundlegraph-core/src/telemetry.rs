//! Log setup for the `bundlegraph` binary.
//!
//! Filtering comes from `BUNDLEGRAPH_LOG`, then `RUST_LOG`, then the
//! verbosity flag. The flag only raises bundlegraph's own targets; other
//! crates stay at `warn`. Lines go to stderr so that plan listings and load
//! orders on stdout can be piped.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable checked before `RUST_LOG`.
pub const LOG_ENV: &str = "BUNDLEGRAPH_LOG";

/// Directive used when neither environment variable is set.
pub fn default_directive(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    format!("warn,bundlegraph={level},bundlegraph_core={level}")
}

fn filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_directive(level)))
}

/// Install the global subscriber. Later calls are ignored.
///
/// Debug level adds source targets to each line, which helps tell resolver
/// events from cache events.
pub fn init_tracing(json: bool, level: Level) {
    let with_target = level >= Level::DEBUG;
    let layer = fmt::layer()
        .with_target(with_target)
        .with_writer(std::io::stderr);

    if json {
        tracing_subscriber::registry()
            .with(filter(level))
            .with(layer.json().with_current_span(true))
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(filter(level))
            .with(layer.compact())
            .try_init()
            .ok();
    }
}
