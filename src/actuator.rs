//! Command-to-duty mapping for the differential ESC drive.
//!
//! A signed command in `[-1, 1]` drives one of two ESC inputs. The idle channel is
//! never switched off: it sits at the armed-minimum pulse so the ESC stays armed.

use std::fmt;

use crate::config::{PULSE_MAX_US, PULSE_MIN_US, PWM_FREQUENCY_HZ, PWM_RESOLUTION_BITS};
use crate::error::RigResult;

/// One of the two drive outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriveChannel {
    A,
    B,
}

impl fmt::Display for DriveChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriveChannel::A => write!(f, "A"),
            DriveChannel::B => write!(f, "B"),
        }
    }
}

/// Anything that can hold a quantized duty on the two drive channels.
pub trait DutyOutput {
    fn set_duty(&mut self, channel: DriveChannel, duty: u32) -> RigResult<()>;
}

/// Duty values for both channels, as produced by [`ActuatorMapper::map_command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DutyPair {
    pub a: u32,
    pub b: u32,
}

/// PWM carrier and ESC pulse range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PwmTiming {
    pub frequency_hz: f32,
    pub resolution_bits: u32,
    pub pulse_min_us: f32,
    pub pulse_max_us: f32,
}

impl Default for PwmTiming {
    fn default() -> Self {
        Self {
            frequency_hz: PWM_FREQUENCY_HZ,
            resolution_bits: PWM_RESOLUTION_BITS,
            pulse_min_us: PULSE_MIN_US,
            pulse_max_us: PULSE_MAX_US,
        }
    }
}

impl PwmTiming {
    /// Carrier period in microseconds.
    pub fn period_us(&self) -> f32 {
        1_000_000.0 / self.frequency_hz
    }

    /// Largest representable duty value.
    pub fn max_duty(&self) -> u32 {
        ((1u64 << self.resolution_bits) - 1) as u32
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ActuatorMapper {
    timing: PwmTiming,
    armed_minimum: u32,
}

impl Default for ActuatorMapper {
    fn default() -> Self {
        Self::new(PwmTiming::default())
    }
}

impl ActuatorMapper {
    pub fn new(timing: PwmTiming) -> Self {
        let mut mapper = Self {
            timing,
            armed_minimum: 0,
        };
        mapper.armed_minimum = mapper.pulse_to_duty(timing.pulse_min_us);
        mapper
    }

    pub fn timing(&self) -> &PwmTiming {
        &self.timing
    }

    /// Duty that holds the ESC armed at idle.
    pub fn armed_minimum(&self) -> u32 {
        self.armed_minimum
    }

    /// Both channels at the armed minimum.
    pub fn parked(&self) -> DutyPair {
        DutyPair {
            a: self.armed_minimum,
            b: self.armed_minimum,
        }
    }

    /// Map a signed control command onto the two channels.
    ///
    /// Commands outside `[-1, 1]` are truncated. NaN parks both channels.
    pub fn map_command(&self, command: f32) -> DutyPair {
        let command = command.clamp(-1.0, 1.0);

        if command > 0.0 {
            DutyPair {
                a: self.magnitude_to_duty(command),
                b: self.armed_minimum,
            }
        } else if command < 0.0 {
            DutyPair {
                a: self.armed_minimum,
                b: self.magnitude_to_duty(-command),
            }
        } else {
            self.parked()
        }
    }

    /// Inverse of [`map_command`](Self::map_command), up to quantization.
    pub fn command_from_duties(&self, duties: DutyPair) -> f32 {
        self.duty_to_magnitude(duties.a) - self.duty_to_magnitude(duties.b)
    }

    fn magnitude_to_duty(&self, magnitude: f32) -> u32 {
        let t = &self.timing;
        let pulse = t.pulse_min_us + magnitude.clamp(0.0, 1.0) * (t.pulse_max_us - t.pulse_min_us);
        self.pulse_to_duty(pulse)
    }

    fn pulse_to_duty(&self, pulse_us: f32) -> u32 {
        let fraction = (pulse_us / self.timing.period_us()).clamp(0.0, 1.0);
        (fraction * self.timing.max_duty() as f32 + 0.5) as u32
    }

    fn duty_to_magnitude(&self, duty: u32) -> f32 {
        let t = &self.timing;
        let pulse = duty as f32 / t.max_duty() as f32 * t.period_us();
        ((pulse - t.pulse_min_us) / (t.pulse_max_us - t.pulse_min_us)).clamp(0.0, 1.0)
    }
}
