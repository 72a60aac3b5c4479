//! Control strategies and the controller state they share.
//!
//! Strategy selection is external input: the loop passes whichever [`Strategy`]
//! its configuration snapshot holds, and the controller dispatches on it. The
//! runtime state (integral, last error, last tick time) is updated on every
//! tick no matter which strategy is active.

use std::fmt;

use serde::Serialize;

use crate::config::{DEFAULT_GAIN_D, DEFAULT_GAIN_I, DEFAULT_GAIN_P, MIN_DERIVATIVE_DT_SECS};

/// Selectable control law.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Output 0.
    #[default]
    Idle,
    /// `p * error`
    Proportional,
    /// Full positive or negative drive depending on the sign of the error.
    BangBang,
    /// `p * error + i * integral + d * derivative`
    Pid,
}

impl Strategy {
    /// Map an external integer selector onto a strategy.
    ///
    /// Anything outside `0..=3` selects [`Strategy::Idle`].
    pub fn from_selector(selector: i64) -> Self {
        match selector {
            1 => Strategy::Proportional,
            2 => Strategy::BangBang,
            3 => Strategy::Pid,
            _ => Strategy::Idle,
        }
    }

    /// Integer selector used on the wire and in telemetry.
    pub fn selector(self) -> u8 {
        match self {
            Strategy::Idle => 0,
            Strategy::Proportional => 1,
            Strategy::BangBang => 2,
            Strategy::Pid => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Strategy::Idle => "Idle",
            Strategy::Proportional => "P-Only",
            Strategy::BangBang => "ON/OFF",
            Strategy::Pid => "PID",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.selector(), self.name())
    }
}

/// Controller gains, tunable at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ControllerGains {
    pub p: f32,
    pub i: f32,
    pub d: f32,
}

impl Default for ControllerGains {
    fn default() -> Self {
        Self {
            p: DEFAULT_GAIN_P,
            i: DEFAULT_GAIN_I,
            d: DEFAULT_GAIN_D,
        }
    }
}

/// State carried between ticks.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControllerRuntimeState {
    pub integral_sum: f32,
    pub last_error: f32,
    pub last_tick_micros: u64,
    /// Set by a reset, cleared by the first step after it.
    pub first_tick: bool,
}

/// What one controller step produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutput {
    pub error: f32,
    pub output: f32,
}

#[derive(Debug, Clone, Default)]
pub struct StrategyController {
    state: ControllerRuntimeState,
}

impl StrategyController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ControllerRuntimeState {
        &self.state
    }

    /// Start a new run session at `now_micros`: clear the integral and the
    /// error history.
    pub fn reset(&mut self, now_micros: u64) {
        self.state = ControllerRuntimeState {
            integral_sum: 0.0,
            last_error: 0.0,
            last_tick_micros: now_micros,
            first_tick: true,
        };
    }

    /// Run one control step.
    ///
    /// `reference` is the calibrated middle, `measurement` the latest angle.
    /// The output is not clamped; the actuator mapper truncates it.
    pub fn step(
        &mut self,
        strategy: Strategy,
        gains: &ControllerGains,
        reference: f32,
        measurement: f32,
        now_micros: u64,
    ) -> StepOutput {
        let dt = now_micros.saturating_sub(self.state.last_tick_micros) as f32 / 1_000_000.0;
        self.state.last_tick_micros = now_micros;

        let error = reference - measurement;

        let output = match strategy {
            Strategy::Idle => 0.0,
            Strategy::Proportional => gains.p * error,
            Strategy::BangBang => {
                if error > 0.0 {
                    1.0
                } else if error < 0.0 {
                    -1.0
                } else {
                    0.0
                }
            }
            Strategy::Pid => {
                // The integral is deliberately left unbounded.
                self.state.integral_sum += error * dt;
                let derivative = if self.state.first_tick {
                    0.0
                } else {
                    (error - self.state.last_error) / dt.max(MIN_DERIVATIVE_DT_SECS)
                };
                gains.p * error + gains.i * self.state.integral_sum + gains.d * derivative
            }
        };

        self.state.last_error = error;
        self.state.first_tick = false;

        StepOutput { error, output }
    }
}
