//! Configuration loading and parsing
//!
//! The TOML file mirrors the command line: every section is optional and
//! command-line flags override whatever the file sets.

use anyhow::{bail, Context, Result};
use kwb_decoder::sources::serial::{DEFAULT_BAUD_RATE, DEFAULT_SERIAL_DEVICE};
use kwb_decoder::sources::tcp::DEFAULT_TCP_ADDRESS;
use kwb_decoder::{
    AggregateState, FilterMode, HeaterConfig, ReplayFormat, SignalMapFilter, StreamConfig,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub signals: SignalsConfig,
    #[serde(default)]
    pub heater: HeaterConfig,
    #[serde(default)]
    pub state: StateConfig,
}

/// Which transport to read from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    #[default]
    Tcp,
    Serial,
    File,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InputConfig {
    #[serde(default)]
    pub kind: InputKind,
    /// `host:port` of a serial-to-network bridge
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_device")]
    pub device: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Capture file for `kind = "file"`
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub format: ReplayFormat,
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
    #[serde(default)]
    pub reconnect: bool,
    #[serde(default)]
    pub filter_mode: FilterMode,
}

fn default_address() -> String {
    DEFAULT_TCP_ADDRESS.to_string()
}

fn default_device() -> String {
    DEFAULT_SERIAL_DEVICE.to_string()
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_read_timeout() -> u64 {
    5000
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            kind: InputKind::default(),
            address: default_address(),
            device: default_device(),
            baud_rate: default_baud_rate(),
            path: None,
            format: ReplayFormat::default(),
            read_timeout_ms: default_read_timeout(),
            reconnect: false,
            filter_mode: FilterMode::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SignalsConfig {
    /// Signal table (CSV)
    #[serde(default = "default_signal_table")]
    pub path: PathBuf,
    #[serde(flatten)]
    pub filter: SignalMapFilter,
}

fn default_signal_table() -> PathBuf {
    PathBuf::from("signals.csv")
}

impl Default for SignalsConfig {
    fn default() -> Self {
        Self {
            path: default_signal_table(),
            filter: SignalMapFilter::default(),
        }
    }
}

/// Counters persisted by a previous run
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct StateConfig {
    #[serde(default)]
    pub run_time_sec: f64,
    #[serde(default)]
    pub energy_kwh: f64,
    #[serde(default)]
    pub pellet_consumption_kg: f64,
}

impl StateConfig {
    pub fn to_state(&self) -> AggregateState {
        AggregateState::resume(self.run_time_sec, self.energy_kwh, self.pellet_consumption_kg)
    }
}

impl AppConfig {
    /// Stream settings for the decoder library
    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig::new()
            .with_reconnect(self.input.reconnect)
            .with_filter_mode(self.input.filter_mode)
            .with_heater(self.heater.clone())
    }

    /// Check settings the decoder would otherwise only reject at runtime
    pub fn validate(&self) -> Result<()> {
        if self.input.kind == InputKind::File && self.input.path.is_none() {
            bail!("input kind is 'file' but no capture path was given");
        }
        if self.input.read_timeout_ms == 0 {
            bail!("read_timeout_ms must be greater than zero");
        }
        if self.state.run_time_sec < 0.0
            || self.state.energy_kwh < 0.0
            || self.state.pellet_consumption_kg < 0.0
        {
            bail!("persisted counters must not be negative");
        }
        self.heater
            .validate()
            .context("Invalid [heater] section")?;
        Ok(())
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_deserialization() {
        let toml_content = r#"
            [input]
            kind = "serial"
            device = "/dev/ttyUSB1"
            reconnect = true
            filter_mode = "permissive"

            [signals]
            path = "easyfire.csv"
            source = 10
            message_ids = [32, 33]

            [heater]
            nominal_power_kw = 25.0

            [state]
            energy_kwh = 1234.5
        "#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.input.kind, InputKind::Serial);
        assert_eq!(config.input.device, "/dev/ttyUSB1");
        assert_eq!(config.input.baud_rate, DEFAULT_BAUD_RATE);
        assert_eq!(config.signals.path, PathBuf::from("easyfire.csv"));
        assert_eq!(config.signals.filter.message_ids, vec![32, 33]);
        assert_eq!(config.heater.nominal_power_kw, 25.0);
        assert_eq!(config.heater.efficiency, 0.9);
        assert_eq!(config.state.energy_kwh, 1234.5);
        assert_eq!(config.state.run_time_sec, 0.0);

        let stream = config.stream_config();
        assert!(stream.reconnect_on_timeout);
        assert_eq!(stream.filter_mode, FilterMode::Permissive);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.input.kind, InputKind::Tcp);
        assert_eq!(config.input.address, DEFAULT_TCP_ADDRESS);
        assert_eq!(config.signals.filter, SignalMapFilter::default());
        assert_eq!(config.state, StateConfig::default());
    }

    #[test]
    fn test_validation() {
        let mut config = AppConfig::default();
        config.input.kind = InputKind::File;
        assert!(config.validate().is_err());

        config.input.path = Some(PathBuf::from("capture.txt"));
        assert!(config.validate().is_ok());

        config.heater.efficiency = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_read_timeout_rejected() {
        let config: AppConfig = toml::from_str("[input]\nread_timeout_ms = 0").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("read_timeout_ms"));

        let config: AppConfig = toml::from_str("[input]\nread_timeout_ms = 1").unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[input]\nkind = \"file\"\npath = \"boiler.log\"\nformat = \"decimal\"").unwrap();
        file.flush().unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.input.format, ReplayFormat::Decimal);
        assert!(load_config(Path::new("/nonexistent/kwb.toml")).is_err());
    }

    #[test]
    fn test_shipped_files_load() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR"));
        let config = load_config(&dir.join("kwb.toml")).unwrap();
        assert!(config.validate().is_ok());

        let map = kwb_decoder::load_signal_map(&dir.join("signals.csv"), &config.signals.filter).unwrap();
        assert_eq!(map.message_ids(), vec![32, 33, 64]);
        assert!(map.signal(33, kwb_decoder::BOILER_OUTPUT_KEY).is_some());
    }
}
