//! Logging for the scanning agent.
//!
//! Stdout carries `DEV`/`END` lines, so every layer writes to stderr or a file.
//!
//! - `--production`: JSON records in a daily log file, plus plain one-line
//!   records on stderr for whoever supervises the agent.
//! - otherwise: pretty stderr output with scan window spans opening and closing.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Overrides the directory for production log files.
pub const LOG_DIR_ENV: &str = "BLESCAN_LOG_DIR";

/// Fallback filter when `RUST_LOG` is unset.
pub const LOG_LEVEL_ENV: &str = "BLESCAN_LOG_LEVEL";

const LOG_FILE_PREFIX: &str = "blescan-agent";

/// Flush guards for the non-blocking writers (file, stderr).
static WRITER_GUARDS: OnceLock<(WorkerGuard, WorkerGuard)> = OnceLock::new();

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `BLESCAN_LOG_LEVEL`, which defaults to `info`.
///
/// # Errors
///
/// Returns an error if the filter does not parse, the log directory cannot
/// be created, or a subscriber is already installed.
pub fn init(production: bool) -> anyhow::Result<()> {
    let level = std::env::var(LOG_LEVEL_ENV).ok();
    let filter = filter(level.as_deref())?;

    if production {
        init_file_and_stderr(filter, &log_directory())
    } else {
        init_stderr(filter)
    }
}

fn filter(level: Option<&str>) -> anyhow::Result<EnvFilter> {
    Ok(EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.unwrap_or("info")))?)
}

fn init_file_and_stderr(filter: EnvFilter, dir: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir)?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .build(dir)?;

    let (file_writer, file_guard) = tracing_appender::non_blocking(appender);
    let (stderr_writer, stderr_guard) = tracing_appender::non_blocking(std::io::stderr());

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(file_writer)
                .with_current_span(true)
                .with_file(true)
                .with_line_number(true),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(stderr_writer)
                .with_ansi(false),
        )
        .try_init()?;

    if WRITER_GUARDS.set((file_guard, stderr_guard)).is_err() {
        anyhow::bail!("logging already initialized");
    }
    tracing::info!(dir = %dir.display(), "writing logs");
    Ok(())
}

fn init_stderr(filter: EnvFilter) -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .pretty()
                .with_writer(std::io::stderr)
                .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE),
        )
        .try_init()?;
    Ok(())
}

/// Where production log files go.
///
/// `BLESCAN_LOG_DIR` if set, else `/var/log/blescan` on Linux, else the
/// platform data directory.
fn log_directory() -> PathBuf {
    if let Some(dir) = std::env::var_os(LOG_DIR_ENV).filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    if cfg!(target_os = "linux") {
        return PathBuf::from("/var/log/blescan");
    }
    directories::ProjectDirs::from("", "", "blescan")
        .map_or_else(|| PathBuf::from("logs"), |dirs| dirs.data_dir().join("logs"))
}
