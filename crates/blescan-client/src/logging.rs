//! Logging for the command-line client.
//!
//! Results go to stdout, so all diagnostics are written to stderr.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default level for a verbosity count from `-v` flags.
#[must_use]
pub const fn level_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Initialize stderr logging.
///
/// `RUST_LOG` takes precedence over `BLESCAN_LOG_LEVEL`, which takes
/// precedence over the `-v` count.
///
/// # Errors
///
/// Returns an error if the filter cannot be parsed.
pub fn init(verbosity: u8) -> anyhow::Result<()> {
    let log_level =
        std::env::var("BLESCAN_LOG_LEVEL").unwrap_or_else(|_| level_for(verbosity).to_string());

    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log_level))?;

    let stderr_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_target(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(level_for(0), "warn");
        assert_eq!(level_for(1), "info");
        assert_eq!(level_for(2), "debug");
        assert_eq!(level_for(9), "trace");
    }
}
