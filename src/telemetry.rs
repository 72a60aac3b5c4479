//! Bounded telemetry buffer with drain-on-read export.

use std::fmt::Write;

use crate::config::TELEMETRY_CAPACITY;
use crate::strategy::Strategy;

/// Column header for exported rows. Exports carry rows only; a client
/// collecting several exports writes this header once.
pub const CSV_HEADER: &str = "timestamp,sensorValue,selectedSensor,error,controlOutput,strategyUsed";

/// One active control tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    /// Microseconds since boot.
    pub timestamp_micros: u64,
    pub measured_value: f32,
    pub sensor_selector: u8,
    pub error: f32,
    pub control_output: f32,
    pub strategy: Strategy,
}

impl Observation {
    fn write_csv_row(&self, out: &mut String) {
        // Writing into a String cannot fail.
        let _ = writeln!(
            out,
            "{},{:.9},{},{:.9},{:.9},{}",
            self.timestamp_micros,
            self.measured_value,
            self.sensor_selector,
            self.error,
            self.control_output,
            self.strategy.selector()
        );
    }
}

/// Append-only buffer that drops new observations once full.
#[derive(Debug, Clone)]
pub struct TelemetryRecorder {
    observations: Vec<Observation>,
    capacity: usize,
}

impl Default for TelemetryRecorder {
    fn default() -> Self {
        Self::with_capacity(TELEMETRY_CAPACITY)
    }
}

impl TelemetryRecorder {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            observations: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Append if there is room. Returns `false` when the observation was dropped.
    pub fn record(&mut self, observation: Observation) -> bool {
        if self.observations.len() >= self.capacity {
            return false;
        }
        self.observations.push(observation);
        true
    }

    /// Serialize everything as CSV rows in insertion order, then empty the buffer.
    pub fn export_and_clear(&mut self) -> String {
        let mut csv = String::new();
        for observation in self.observations.drain(..) {
            observation.write_csv_row(&mut csv);
        }
        csv
    }

    /// Empty the buffer without serializing.
    pub fn clear(&mut self) {
        self.observations.clear();
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.observations.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }
}
