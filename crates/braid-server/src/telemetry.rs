//! Logging setup shared by both binaries

use tracing_subscriber::EnvFilter;

/// Selects the JSON formatter when set to `json`
pub const LOG_FORMAT_ENV: &str = "BRAID_LOG_FORMAT";

/// Install the global subscriber, writing to stderr.
///
/// `RUST_LOG` overrides `default_level`.
pub fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let json = std::env::var(LOG_FORMAT_ENV).is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    // A second install (tests, embedding) keeps the first subscriber
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.with_ansi(false).try_init()
    };
    if let Err(e) = installed {
        tracing::debug!("Tracing subscriber already installed: {}", e);
    }
}
