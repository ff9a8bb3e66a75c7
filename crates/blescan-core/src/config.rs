//! Layered configuration for the client and agent.
//!
//! Sources, later ones overriding earlier ones:
//!
//! 1. Built-in defaults
//! 2. A TOML file: an explicit path, or `config.toml` in the platform
//!    config directory when present
//! 3. Environment variables prefixed `BLESCAN_`, with `__` between section
//!    and key (`BLESCAN_AGENT__MIN_RSSI=-90`)
//!
//! Command-line flags are applied on top by the binaries.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::aggregator::DEFAULT_INITIAL_CAPACITY;
use crate::error::ScanError;
use crate::framer::DEFAULT_LINE_CAPACITY;
use crate::presenter::OutputFormat;
use crate::session::{EmitMode, SessionOptions};
use crate::types::PRODUCER_NAME_CAPACITY;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "BLESCAN";

/// Config file name inside the platform config directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Errors from loading, validating or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly requested file does not exist.
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// A source could not be read or did not match the schema.
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    /// Settings could not be rendered as TOML.
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// The config file could not be written.
    #[error("failed to write {}: {source}", path.display())]
    Write {
        /// Destination path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A value is out of range.
    #[error("invalid {field}: {message}")]
    Validation {
        /// Dotted key of the offending value.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

fn invalid(field: &'static str, message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field,
        message: message.into(),
    }
}

// ============================================================================
// Sections
// ============================================================================

/// Serial link settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    /// Line speed; the link is always 8N1 without flow control.
    pub baud_rate: u32,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self { baud_rate: 115_200 }
    }
}

/// Consumer-side line framing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FramerSettings {
    /// Longest single wait for a byte.
    pub poll_interval_ms: u64,
    /// Line buffer size, terminator included.
    pub line_capacity: usize,
    /// Seconds allowed beyond the scan window for each line.
    pub grace_secs: u64,
}

impl Default for FramerSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            line_capacity: DEFAULT_LINE_CAPACITY,
            grace_secs: 10,
        }
    }
}

impl FramerSettings {
    /// Poll interval as a [`Duration`].
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Per-line deadline for a scan of `timeout_ms`: whole seconds plus grace.
    #[must_use]
    pub const fn line_deadline(&self, timeout_ms: u32) -> Duration {
        Duration::from_secs((timeout_ms / 1000) as u64 + self.grace_secs)
    }
}

/// Accepted scan window lengths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanLimits {
    /// Shortest window in milliseconds.
    pub min_timeout_ms: u32,
    /// Longest window in milliseconds.
    pub max_timeout_ms: u32,
}

impl Default for ScanLimits {
    fn default() -> Self {
        Self {
            min_timeout_ms: 1000,
            max_timeout_ms: 300_000,
        }
    }
}

impl ScanLimits {
    /// Check a requested window length.
    ///
    /// # Errors
    ///
    /// [`ScanError::InvalidScanTimeout`] when outside the configured range.
    pub fn check(&self, timeout_ms: u32) -> Result<u32, ScanError> {
        if timeout_ms < self.min_timeout_ms || timeout_ms > self.max_timeout_ms {
            return Err(ScanError::InvalidScanTimeout {
                value: timeout_ms as u64,
                min: self.min_timeout_ms,
                max: self.max_timeout_ms,
            });
        }
        Ok(timeout_ms)
    }
}

/// Consumer result rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    /// Output format.
    pub format: OutputFormat,
    /// Hide devices weaker than this.
    pub min_rssi: Option<i32>,
}

/// Consumer-side aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorSettings {
    /// Initial device capacity.
    pub initial_capacity: usize,
    /// Most distinct devices kept; unbounded when unset.
    pub max_devices: Option<usize>,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            max_devices: None,
        }
    }
}

/// Producer agent behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Window length in continuous mode.
    pub window_ms: u32,
    /// Pause between continuous windows.
    pub cooldown_ms: u64,
    /// Most distinct devices per window.
    pub max_devices: Option<usize>,
    /// Name buffer size, terminator included.
    pub name_capacity: usize,
    /// Weakest signal reported.
    pub min_rssi: Option<i32>,
    /// Scan back-to-back without waiting for commands.
    pub continuous: bool,
    /// When `DEV` lines are written.
    pub emit_mode: EmitMode,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            window_ms: 5000,
            cooldown_ms: 500,
            max_devices: Some(100),
            name_capacity: PRODUCER_NAME_CAPACITY,
            min_rssi: Some(-85),
            continuous: false,
            emit_mode: EmitMode::Aggregated,
        }
    }
}

impl AgentSettings {
    /// Session options derived from these settings.
    #[must_use]
    pub const fn session_options(&self, initial_capacity: usize) -> SessionOptions {
        SessionOptions {
            name_capacity: self.name_capacity,
            max_devices: self.max_devices,
            min_rssi: self.min_rssi,
            emit_mode: self.emit_mode,
            initial_capacity,
        }
    }

    /// Continuous-mode window length.
    #[must_use]
    pub const fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms as u64)
    }

    /// Pause between continuous windows.
    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

// ============================================================================
// Settings
// ============================================================================

/// All configuration sections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Serial link.
    pub serial: SerialSettings,
    /// Line framing.
    pub framer: FramerSettings,
    /// Window length limits.
    pub scan: ScanLimits,
    /// Result rendering.
    pub report: ReportSettings,
    /// Consumer aggregation.
    pub aggregator: AggregatorSettings,
    /// Producer agent.
    pub agent: AgentSettings,
}

impl Settings {
    /// Load settings from defaults, file and environment.
    ///
    /// With `path` set, that file must exist. Otherwise the default location
    /// is used if a file is there.
    ///
    /// # Errors
    ///
    /// [`ConfigError::NotFound`] for a missing explicit file, [`ConfigError::Load`]
    /// for unreadable or mistyped sources, [`ConfigError::Validation`] for
    /// out-of-range values.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        Self::load_with_env(path, None)
    }

    /// Like [`load`](Self::load), reading environment overrides from `env`
    /// instead of the process environment when given.
    ///
    /// # Errors
    ///
    /// As for [`load`](Self::load).
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> ConfigResult<Self> {
        let mut builder =
            ::config::Config::builder().add_source(::config::Config::try_from(&Self::default())?);

        match path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound(path.to_path_buf()));
                }
                debug!(path = %path.display(), "loading config file");
                builder = builder.add_source(
                    ::config::File::from(path).format(::config::FileFormat::Toml),
                );
            }
            None => {
                if let Some(default) = default_path().filter(|p| p.exists()) {
                    debug!(path = %default.display(), "loading config file");
                    builder = builder.add_source(
                        ::config::File::from(default.as_path()).format(::config::FileFormat::Toml),
                    );
                }
            }
        }

        let settings: Self = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Validation`] naming the first offending key.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.serial.baud_rate == 0 {
            return Err(invalid("serial.baud_rate", "must be positive"));
        }
        if self.framer.line_capacity < 2 {
            return Err(invalid("framer.line_capacity", "must be at least 2"));
        }
        if self.framer.poll_interval_ms == 0 {
            return Err(invalid("framer.poll_interval_ms", "must be positive"));
        }
        if self.scan.min_timeout_ms == 0 {
            return Err(invalid("scan.min_timeout_ms", "must be positive"));
        }
        if self.scan.min_timeout_ms > self.scan.max_timeout_ms {
            return Err(invalid(
                "scan.min_timeout_ms",
                format!(
                    "{} exceeds scan.max_timeout_ms {}",
                    self.scan.min_timeout_ms, self.scan.max_timeout_ms
                ),
            ));
        }
        if self.aggregator.initial_capacity == 0 {
            return Err(invalid("aggregator.initial_capacity", "must be positive"));
        }
        if self.agent.name_capacity == 0 {
            return Err(invalid("agent.name_capacity", "must be positive"));
        }
        if self.agent.window_ms == 0 {
            return Err(invalid("agent.window_ms", "must be positive"));
        }
        Ok(())
    }

    /// Write settings as TOML, creating parent directories.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Serialize`] or [`ConfigError::Write`].
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self)?;
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        std::fs::write(path, content).map_err(write_err)
    }
}

/// `config.toml` in the platform config directory, if one can be determined.
#[must_use]
pub fn default_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "blescan")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn load_file(contents: &str) -> ConfigResult<Settings> {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        Settings::load_with_env(Some(file.path()), Some(HashMap::new()))
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.serial.baud_rate, 115_200);
        assert_eq!(settings.framer.line_capacity, 256);
        assert_eq!(settings.scan.min_timeout_ms, 1000);
        assert_eq!(settings.scan.max_timeout_ms, 300_000);
        assert_eq!(settings.agent.min_rssi, Some(-85));
        assert_eq!(settings.agent.max_devices, Some(100));
        assert_eq!(settings.agent.name_capacity, 32);
        assert_eq!(settings.report.format, OutputFormat::Table);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let settings = load_file(
            r#"
            [report]
            format = "csv"
            min_rssi = -70

            [agent]
            emit_mode = "passthrough"
            continuous = true
            "#,
        )
        .unwrap();

        assert_eq!(settings.report.format, OutputFormat::Csv);
        assert_eq!(settings.report.min_rssi, Some(-70));
        assert_eq!(settings.agent.emit_mode, EmitMode::Passthrough);
        assert!(settings.agent.continuous);
        assert_eq!(settings.serial.baud_rate, 115_200);
    }

    #[test]
    fn test_env_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(b"[serial]\nbaud_rate = 9600\n").unwrap();

        let env = HashMap::from([
            ("BLESCAN_SERIAL__BAUD_RATE".to_owned(), "57600".to_owned()),
            ("BLESCAN_AGENT__WINDOW_MS".to_owned(), "2000".to_owned()),
        ]);
        let settings = Settings::load_with_env(Some(file.path()), Some(env)).unwrap();

        assert_eq!(settings.serial.baud_rate, 57_600);
        assert_eq!(settings.agent.window_ms, 2000);
    }

    #[test]
    fn test_missing_explicit_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(matches!(
            Settings::load_with_env(Some(&path), Some(HashMap::new())),
            Err(ConfigError::NotFound(_))
        ));
    }

    #[test]
    fn test_malformed_file() {
        assert!(matches!(
            load_file("[serial]\nbaud_rate = \"fast\"\n"),
            Err(ConfigError::Load(_))
        ));
    }

    #[test]
    fn test_validation_errors() {
        assert!(matches!(
            load_file("[framer]\nline_capacity = 1\n"),
            Err(ConfigError::Validation { field: "framer.line_capacity", .. })
        ));
        assert!(matches!(
            load_file("[scan]\nmin_timeout_ms = 5000\nmax_timeout_ms = 1000\n"),
            Err(ConfigError::Validation { field: "scan.min_timeout_ms", .. })
        ));
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        let mut settings = Settings::default();
        settings.report.format = OutputFormat::Json;
        settings.agent.cooldown_ms = 750;
        settings.save(&path).unwrap();

        let loaded = Settings::load_with_env(Some(&path), Some(HashMap::new())).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_scan_limits() {
        let limits = ScanLimits::default();
        assert_eq!(limits.check(1000).unwrap(), 1000);
        assert_eq!(limits.check(300_000).unwrap(), 300_000);
        assert!(matches!(
            limits.check(999),
            Err(ScanError::InvalidScanTimeout { value: 999, min: 1000, max: 300_000 })
        ));
        assert!(limits.check(300_001).is_err());
    }

    #[test]
    fn test_line_deadline_adds_grace() {
        let framer = FramerSettings::default();
        assert_eq!(framer.line_deadline(10_000), Duration::from_secs(20));
        assert_eq!(framer.line_deadline(1500), Duration::from_secs(11));
    }

    #[test]
    fn test_session_options_from_agent_settings() {
        let options = AgentSettings::default().session_options(16);
        assert_eq!(options.min_rssi, Some(-85));
        assert_eq!(options.max_devices, Some(100));
        assert_eq!(options.initial_capacity, 16);
        assert_eq!(options.emit_mode, EmitMode::Aggregated);
    }
}
