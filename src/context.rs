//! State shared between the control loop and the remote surface.
//!
//! The configuration is one record behind one lock. The loop copies the whole
//! record once at the start of each tick, so a tick never sees half of an
//! update. Writers go through [`RigContext::update`], which also bumps the
//! revision counter.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::calibration::{CalibrationSide, CalibrationState};
use crate::strategy::{ControllerGains, Strategy};
use crate::telemetry::{Observation, TelemetryRecorder};

/// Everything the remote surface may change.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControlConfig {
    pub running: bool,
    pub strategy: Strategy,
    pub sensor_selector: u8,
    pub gains: ControllerGains,
    pub calibration: CalibrationState,
    /// Incremented by every update.
    pub revision: u64,
}

/// What the loop reports back for status rendering.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LoopStatus {
    pub last_sensor_update_micros: Option<u64>,
    pub calibrating: Option<CalibrationSide>,
    pub active: bool,
}

pub struct RigContext {
    config: Mutex<ControlConfig>,
    telemetry: Mutex<TelemetryRecorder>,
    /// Runs wait here in request order, at most one per side.
    calibration_requests: Mutex<VecDeque<CalibrationSide>>,
    status: Mutex<LoopStatus>,
}

/// A panic while holding a lock leaves plain data behind; keep using it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Default for RigContext {
    fn default() -> Self {
        Self::new(ControlConfig::default())
    }
}

impl RigContext {
    pub fn new(config: ControlConfig) -> Self {
        Self::with_telemetry(config, TelemetryRecorder::default())
    }

    pub fn with_telemetry(config: ControlConfig, telemetry: TelemetryRecorder) -> Self {
        Self {
            config: Mutex::new(config),
            telemetry: Mutex::new(telemetry),
            calibration_requests: Mutex::new(VecDeque::with_capacity(2)),
            status: Mutex::new(LoopStatus::default()),
        }
    }

    /// Consistent copy of the whole configuration.
    pub fn snapshot(&self) -> ControlConfig {
        *lock(&self.config)
    }

    /// Apply `f` atomically and return the new revision.
    pub fn update<F>(&self, f: F) -> u64
    where
        F: FnOnce(&mut ControlConfig),
    {
        let mut config = lock(&self.config);
        f(&mut config);
        config.revision = config.revision.wrapping_add(1);
        config.revision
    }

    /// Queue a calibration run behind any pending ones. Returns `false` if a
    /// run for the same side is already waiting.
    pub fn request_calibration(&self, side: CalibrationSide) -> bool {
        let mut pending = lock(&self.calibration_requests);
        if pending.contains(&side) {
            return false;
        }
        pending.push_back(side);
        true
    }

    /// Oldest pending request, removed from the queue.
    pub fn take_calibration_request(&self) -> Option<CalibrationSide> {
        lock(&self.calibration_requests).pop_front()
    }

    /// Oldest pending request, left in the queue.
    pub fn pending_calibration(&self) -> Option<CalibrationSide> {
        lock(&self.calibration_requests).front().copied()
    }

    /// Append to telemetry if there is room.
    pub fn record_observation(&self, observation: Observation) -> bool {
        lock(&self.telemetry).record(observation)
    }

    pub fn clear_telemetry(&self) {
        lock(&self.telemetry).clear();
    }

    /// Drain all buffered observations as CSV rows.
    pub fn drain_telemetry(&self) -> String {
        lock(&self.telemetry).export_and_clear()
    }

    pub fn buffered_observations(&self) -> usize {
        lock(&self.telemetry).len()
    }

    pub fn publish_status(&self, status: LoopStatus) {
        *lock(&self.status) = status;
    }

    pub fn loop_status(&self) -> LoopStatus {
        *lock(&self.status)
    }
}
