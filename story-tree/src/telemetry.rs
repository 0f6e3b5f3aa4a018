//! Logging setup.
//!
//! Installs a `tracing-subscriber` registry writing compact lines to stderr,
//! so stdout stays free for command output.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing subscriber with the given log level from config.
///
/// Priority: `RUST_LOG` env var > `log_level` parameter. Calling this more
/// than once is harmless; only the first subscriber is installed.
pub fn init_telemetry(log_level: &str) {
    let default_filter = format!("{log_level},story_tree={log_level}");

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init()
        .ok();
}
