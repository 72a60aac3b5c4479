pub mod actuator;
pub mod calibration;
pub mod config;
pub mod context;
pub mod control_loop;
pub mod error;
pub mod magnetometer;
pub mod pwm;
pub mod remote;
pub mod sensor;
pub mod sim;
pub mod strategy;
pub mod telemetry;
pub mod web;

// Re-export commonly used types
pub use actuator::{ActuatorMapper, DriveChannel, DutyOutput, DutyPair};
pub use calibration::{CalibrationSide, CalibrationState};
pub use context::{ControlConfig, RigContext};
pub use control_loop::{ControlLoop, TickOutcome};
pub use error::{RigError, RigResult};
pub use sensor::{BootClock, OrientationSensor, SensorFeed};
pub use strategy::{ControllerGains, Strategy};
pub use telemetry::Observation;

// This module is only compiled during testing.
#[cfg(test)]
pub(crate) mod mocks;
