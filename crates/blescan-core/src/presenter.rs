//! Rendering of finished scan results.

use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::DeviceRecord;

/// Shown in table mode for devices without a name.
pub const NO_NAME_PLACEHOLDER: &str = "<No Name>";

/// How results are printed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Aligned human-readable table.
    #[default]
    Table,
    /// `MAC,RSSI,Name` rows.
    Csv,
    /// Pretty-printed JSON report.
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Table => "table",
            Self::Csv => "csv",
            Self::Json => "json",
        })
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "unknown output format '{other}' (expected table, csv or json)"
            )),
        }
    }
}

/// Machine-readable scan report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    /// When the report was rendered.
    pub scanned_at_utc: DateTime<Utc>,
    /// Number of devices listed.
    pub device_count: usize,
    /// Threshold applied, if any.
    pub min_rssi: Option<i32>,
    /// Devices, strongest first.
    pub devices: Vec<DeviceRecord>,
}

/// Renders a signal-sorted device list.
#[derive(Debug, Clone, Copy, Default)]
pub struct Presenter {
    format: OutputFormat,
    min_rssi: Option<i32>,
}

impl Presenter {
    /// Create a presenter for the given format.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self {
            format,
            min_rssi: None,
        }
    }

    /// Hide devices weaker than `min_rssi` dBm.
    #[must_use]
    pub const fn with_min_rssi(mut self, min_rssi: Option<i32>) -> Self {
        self.min_rssi = min_rssi;
        self
    }

    /// The configured format.
    #[must_use]
    pub const fn format(&self) -> OutputFormat {
        self.format
    }

    /// Render `devices`, which must already be sorted strongest first.
    #[must_use]
    pub fn render(&self, devices: &[DeviceRecord]) -> String {
        let shown: Vec<&DeviceRecord> = devices
            .iter()
            .filter(|d| self.min_rssi.map_or(true, |min| d.signal_strength >= min))
            .collect();

        match self.format {
            OutputFormat::Table => self.render_table(devices.len(), &shown),
            OutputFormat::Csv => Self::render_csv(&shown),
            OutputFormat::Json => self.render_json(shown),
        }
    }

    /// Render `devices` into `out`.
    ///
    /// # Errors
    ///
    /// Propagates write failures from `out`.
    pub fn write_to<W: Write + ?Sized>(&self, out: &mut W, devices: &[DeviceRecord]) -> io::Result<()> {
        out.write_all(self.render(devices).as_bytes())?;
        out.flush()
    }

    fn render_table(&self, total: usize, shown: &[&DeviceRecord]) -> String {
        let mut out = format!("\nScan completed. Found {} device(s):\n", shown.len());
        if let Some(min) = self.min_rssi {
            out.push_str(&format!("({total} total, showing RSSI >= {min} dBm)\n"));
        }

        if shown.is_empty() {
            out.push_str("No BLE devices found.\n");
            return out;
        }

        for (mac, rssi, name) in [
            ("MAC Address", "RSSI", "Device Name"),
            ("-----------", "----", "-----------"),
        ] {
            out.push_str(format!("{mac:<17} {rssi:>6} {name:<20}").trim_end());
            out.push('\n');
        }
        for device in shown {
            let name = if device.has_name() {
                device.name_or_empty()
            } else {
                NO_NAME_PLACEHOLDER
            };
            out.push_str(&format!(
                "{:<17} {:>4}   {name}\n",
                device.address.to_string(),
                device.signal_strength
            ));
        }
        out
    }

    fn render_csv(shown: &[&DeviceRecord]) -> String {
        shown.iter().fold(String::from("MAC,RSSI,Name\n"), |mut out, device| {
            out.push_str(&format!(
                "{},{},{}\n",
                device.address,
                device.signal_strength,
                device.name_or_empty()
            ));
            out
        })
    }

    fn render_json(&self, shown: Vec<&DeviceRecord>) -> String {
        let report = ScanReport {
            scanned_at_utc: Utc::now(),
            device_count: shown.len(),
            min_rssi: self.min_rssi,
            devices: shown.into_iter().cloned().collect(),
        };
        // Serializing plain data with string keys cannot fail.
        let mut json = serde_json::to_string_pretty(&report).unwrap_or_default();
        json.push('\n');
        json
    }
}
