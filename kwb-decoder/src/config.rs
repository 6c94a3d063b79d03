//! Stream and heater configuration types
//!
//! Everything here is supplied by the caller and read-only for the lifetime
//! of a [`crate::MessageStream`].

use crate::types::{DecoderError, Result};
use serde::{Deserialize, Serialize};

/// Physical constants of the heating unit used for energy accounting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaterConfig {
    /// Output at 100 % boiler output, in kW
    #[serde(default = "default_nominal_power")]
    pub nominal_power_kw: f64,

    /// Combustion efficiency, in (0, 1]
    #[serde(default = "default_efficiency")]
    pub efficiency: f64,

    /// Energy content of the fuel, in kWh per kg of pellets
    #[serde(default = "default_pellet_energy")]
    pub pellet_energy_kwh_per_kg: f64,
}

fn default_nominal_power() -> f64 {
    15.0
}

fn default_efficiency() -> f64 {
    0.9
}

fn default_pellet_energy() -> f64 {
    4.8
}

impl Default for HeaterConfig {
    fn default() -> Self {
        Self {
            nominal_power_kw: default_nominal_power(),
            efficiency: default_efficiency(),
            pellet_energy_kwh_per_kg: default_pellet_energy(),
        }
    }
}

impl HeaterConfig {
    /// Create a heater configuration
    pub fn new(nominal_power_kw: f64, efficiency: f64, pellet_energy_kwh_per_kg: f64) -> Self {
        Self {
            nominal_power_kw,
            efficiency,
            pellet_energy_kwh_per_kg,
        }
    }

    /// Reject constants that would make the energy model meaningless
    pub fn validate(&self) -> Result<()> {
        if !(self.nominal_power_kw.is_finite() && self.nominal_power_kw > 0.0) {
            return Err(DecoderError::InvalidArgument(format!(
                "nominal power must be positive, got {}",
                self.nominal_power_kw
            )));
        }
        if !(self.efficiency > 0.0 && self.efficiency <= 1.0) {
            return Err(DecoderError::InvalidArgument(format!(
                "efficiency must be in (0, 1], got {}",
                self.efficiency
            )));
        }
        if !(self.pellet_energy_kwh_per_kg.is_finite() && self.pellet_energy_kwh_per_kg > 0.0) {
            return Err(DecoderError::InvalidArgument(format!(
                "pellet energy must be positive, got {}",
                self.pellet_energy_kwh_per_kg
            )));
        }
        Ok(())
    }
}

/// How `read_messages` treats ids outside the requested set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// Emit only requested ids, each once
    #[default]
    Strict,
    /// Emit the first message of every id, requested or not, until all
    /// requested ids were seen (behaviour of the historical reader)
    Permissive,
}

/// Configuration for a message stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Close and reopen the byte source when a read times out
    #[serde(default)]
    pub reconnect_on_timeout: bool,

    /// Id filter semantics for filtered reads
    #[serde(default)]
    pub filter_mode: FilterMode,

    /// Heater constants for energy accounting
    #[serde(default)]
    pub heater: HeaterConfig,
}

impl StreamConfig {
    /// Create a stream configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: enable or disable reconnect on timeout
    pub fn with_reconnect(mut self, enabled: bool) -> Self {
        self.reconnect_on_timeout = enabled;
        self
    }

    /// Builder method: set the id filter mode
    pub fn with_filter_mode(mut self, mode: FilterMode) -> Self {
        self.filter_mode = mode;
        self
    }

    /// Builder method: set heater constants
    pub fn with_heater(mut self, heater: HeaterConfig) -> Self {
        self.heater = heater;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_config_builder() {
        let config = StreamConfig::new()
            .with_reconnect(true)
            .with_filter_mode(FilterMode::Permissive)
            .with_heater(HeaterConfig::new(25.0, 0.92, 5.0));

        assert!(config.reconnect_on_timeout);
        assert_eq!(config.filter_mode, FilterMode::Permissive);
        assert_eq!(config.heater.nominal_power_kw, 25.0);
    }

    #[test]
    fn test_defaults() {
        let config = StreamConfig::new();
        assert!(!config.reconnect_on_timeout);
        assert_eq!(config.filter_mode, FilterMode::Strict);
        assert!(config.heater.validate().is_ok());
    }

    #[test]
    fn test_heater_validation() {
        assert!(HeaterConfig::new(15.0, 1.0, 4.8).validate().is_ok());
        assert!(HeaterConfig::new(15.0, 0.0, 4.8).validate().is_err());
        assert!(HeaterConfig::new(15.0, 1.01, 4.8).validate().is_err());
        assert!(HeaterConfig::new(0.0, 0.9, 4.8).validate().is_err());
        assert!(HeaterConfig::new(15.0, 0.9, -1.0).validate().is_err());
        assert!(HeaterConfig::new(f64::NAN, 0.9, 4.8).validate().is_err());
    }
}
