//! Energy and runtime accounting
//!
//! Integrates the `boiler_output` percentage over time into runtime, heat
//! energy and pellet consumption. The state is plain data owned by the
//! caller's stream: seed it from persisted values at startup and read it back
//! before shutdown.

use crate::config::HeaterConfig;
use crate::types::DecodedSignal;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Signal key carrying the boiler output percentage (0-100)
pub const BOILER_OUTPUT_KEY: &str = "boiler_output";

/// Running counters derived from the boiler output
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregateState {
    /// Time of the previous update, milliseconds since the Unix epoch
    pub last_timestamp_msec: f64,
    /// Accumulated burner runtime in seconds
    pub run_time_sec: f64,
    /// Accumulated heat output in kWh
    pub energy_kwh: f64,
    /// Accumulated fuel use in kg
    pub pellet_consumption_kg: f64,
}

impl Default for AggregateState {
    fn default() -> Self {
        Self::resume(0.0, 0.0, 0.0)
    }
}

impl AggregateState {
    pub fn new(
        last_timestamp_msec: f64,
        run_time_sec: f64,
        energy_kwh: f64,
        pellet_consumption_kg: f64,
    ) -> Self {
        Self {
            last_timestamp_msec,
            run_time_sec,
            energy_kwh,
            pellet_consumption_kg,
        }
    }

    /// Continue from persisted counters, starting the clock now
    pub fn resume(run_time_sec: f64, energy_kwh: f64, pellet_consumption_kg: f64) -> Self {
        Self::new(
            Utc::now().timestamp_millis() as f64,
            run_time_sec,
            energy_kwh,
            pellet_consumption_kg,
        )
    }

    /// Advance the clock to `now_msec`, accumulating if the boiler is firing
    ///
    /// Returns whether the boiler counts as on. A missing output value counts
    /// as off. Time running backwards contributes nothing.
    pub fn update(&mut self, boiler_output: Option<f64>, now_msec: f64, heater: &HeaterConfig) -> bool {
        let delta_t_sec = ((now_msec - self.last_timestamp_msec) / 1000.0).max(0.0);
        let delta_t_hr = delta_t_sec / 3600.0;
        let output_fraction = boiler_output.unwrap_or(0.0) / 100.0;

        let boiler_on = output_fraction > 0.0;
        if boiler_on {
            let delta_energy_kwh = delta_t_hr * output_fraction * heater.nominal_power_kw;
            self.run_time_sec += delta_t_sec;
            self.energy_kwh += delta_energy_kwh;
            self.pellet_consumption_kg +=
                delta_energy_kwh / (heater.pellet_energy_kwh_per_kg * heater.efficiency);
        }
        self.last_timestamp_msec = now_msec;
        boiler_on
    }
}

/// One emission of the derived-metrics stream
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataRecord {
    /// Id of the message that triggered this record
    pub message_id: u8,
    /// Last known value of every signal seen so far
    pub signals: BTreeMap<String, DecodedSignal>,
    pub boiler_on: bool,
    pub nominal_power_kw: f64,
    pub run_time_sec: f64,
    pub energy_kwh: f64,
    pub pellet_consumption_kg: f64,
    pub last_timestamp_msec: f64,
}

impl DataRecord {
    /// Value of a signal by key (`None` if unknown or disconnected)
    pub fn value(&self, key: &str) -> Option<f64> {
        self.signals.get(key).and_then(|signal| signal.value)
    }
}

/// Keeps last-known signal values and the accumulated counters
#[derive(Debug, Clone)]
pub struct Aggregator {
    heater: HeaterConfig,
    state: AggregateState,
    signals: BTreeMap<String, DecodedSignal>,
}

impl Aggregator {
    pub fn new(heater: HeaterConfig, state: AggregateState) -> Self {
        Self {
            heater,
            state,
            signals: BTreeMap::new(),
        }
    }

    /// Merge freshly decoded signals and advance the counters
    pub fn apply(&mut self, message_id: u8, decoded: Vec<DecodedSignal>, now_msec: f64) -> DataRecord {
        for signal in decoded {
            self.signals.insert(signal.key.clone(), signal);
        }

        let boiler_output = self
            .signals
            .get(BOILER_OUTPUT_KEY)
            .and_then(|signal| signal.value);
        let boiler_on = self.state.update(boiler_output, now_msec, &self.heater);

        log::trace!(
            "Message {}: boiler_on={} run_time={:.0}s energy={:.3}kWh pellets={:.3}kg",
            message_id,
            boiler_on,
            self.state.run_time_sec,
            self.state.energy_kwh,
            self.state.pellet_consumption_kg
        );

        DataRecord {
            message_id,
            signals: self.signals.clone(),
            boiler_on,
            nominal_power_kw: self.heater.nominal_power_kw,
            run_time_sec: self.state.run_time_sec,
            energy_kwh: self.state.energy_kwh,
            pellet_consumption_kg: self.state.pellet_consumption_kg,
            last_timestamp_msec: self.state.last_timestamp_msec,
        }
    }

    pub fn state(&self) -> &AggregateState {
        &self.state
    }

    pub fn into_state(self) -> AggregateState {
        self.state
    }

    /// Last known value of every signal seen so far
    pub fn signals(&self) -> &BTreeMap<String, DecodedSignal> {
        &self.signals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(key: &str, value: Option<f64>) -> DecodedSignal {
        DecodedSignal {
            key: key.to_string(),
            name: key.to_string(),
            value,
            unit: None,
            state_class: String::new(),
            device_class: String::new(),
        }
    }

    fn heater() -> HeaterConfig {
        HeaterConfig::new(15.0, 0.9, 4.8)
    }

    #[test]
    fn test_one_hour_at_half_output() {
        let mut state = AggregateState::new(0.0, 0.0, 0.0, 0.0);
        let on = state.update(Some(50.0), 3_600_000.0, &heater());

        assert!(on);
        assert_eq!(state.run_time_sec, 3600.0);
        assert!((state.energy_kwh - 7.5).abs() < 1e-9);
        assert!((state.pellet_consumption_kg - 7.5 / (4.8 * 0.9)).abs() < 1e-9);
        assert_eq!(state.last_timestamp_msec, 3_600_000.0);
    }

    #[test]
    fn test_off_only_moves_clock() {
        let mut state = AggregateState::new(1000.0, 10.0, 2.0, 0.5);
        assert!(!state.update(Some(0.0), 61_000.0, &heater()));
        assert!(!state.update(None, 121_000.0, &heater()));
        assert_eq!(state, AggregateState::new(121_000.0, 10.0, 2.0, 0.5));
    }

    #[test]
    fn test_clock_going_backwards_adds_nothing() {
        let mut state = AggregateState::new(10_000.0, 5.0, 1.0, 0.2);
        assert!(state.update(Some(100.0), 5_000.0, &heater()));
        assert_eq!(state.run_time_sec, 5.0);
        assert_eq!(state.energy_kwh, 1.0);
        assert_eq!(state.last_timestamp_msec, 5_000.0);
    }

    #[test]
    fn test_idempotent_without_boiler_output() {
        let seed = AggregateState::new(0.0, 123.0, 4.5, 1.25);
        let mut aggregator = Aggregator::new(heater(), seed);
        for i in 1..=10 {
            let record = aggregator.apply(32, vec![signal("heater_temp", Some(60.0))], i as f64 * 3_600_000.0);
            assert!(!record.boiler_on);
            assert_eq!(record.run_time_sec, 123.0);
            assert_eq!(record.energy_kwh, 4.5);
            assert_eq!(record.pellet_consumption_kg, 1.25);
        }
    }

    #[test]
    fn test_monotonic_while_firing() {
        let mut aggregator = Aggregator::new(heater(), AggregateState::new(0.0, 0.0, 0.0, 0.0));
        let mut previous = *aggregator.state();
        for (i, output) in [10.0, 100.0, 35.0, 1.0, 80.0].into_iter().enumerate() {
            let now = (i as f64 + 1.0) * 30_000.0;
            let record = aggregator.apply(33, vec![signal(BOILER_OUTPUT_KEY, Some(output))], now);
            assert!(record.boiler_on);
            assert!(record.run_time_sec > previous.run_time_sec);
            assert!(record.energy_kwh > previous.energy_kwh);
            assert!(record.pellet_consumption_kg > previous.pellet_consumption_kg);
            previous = *aggregator.state();
        }
        assert_eq!(previous.run_time_sec, 150.0);
    }

    #[test]
    fn test_last_known_values_are_kept() {
        let mut aggregator = Aggregator::new(heater(), AggregateState::new(0.0, 0.0, 0.0, 0.0));
        aggregator.apply(
            33,
            vec![signal(BOILER_OUTPUT_KEY, Some(40.0)), signal("ignition", Some(1.0))],
            0.0,
        );
        let record = aggregator.apply(32, vec![signal("heater_temp", Some(65.0))], 60_000.0);

        assert_eq!(record.message_id, 32);
        assert_eq!(record.value("ignition"), Some(1.0));
        assert_eq!(record.value("heater_temp"), Some(65.0));
        // Output last reported by message 33 still drives accounting
        assert!(record.boiler_on);
        assert_eq!(record.run_time_sec, 60.0);
        assert!((record.energy_kwh - (60.0 / 3600.0) * 0.4 * 15.0).abs() < 1e-12);
        assert_eq!(record.nominal_power_kw, 15.0);

        let record = aggregator.apply(33, vec![signal(BOILER_OUTPUT_KEY, Some(0.0))], 120_000.0);
        assert!(!record.boiler_on);
        assert_eq!(record.run_time_sec, 60.0);
        assert_eq!(aggregator.signals().len(), 3);
    }
}
