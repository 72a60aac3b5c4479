//! Simulated rig for running without hardware.
//!
//! A damped rotational oscillator driven by the actuator command, observed by a
//! noisy sensor that reports at a fixed rate. [`SimActuator`] and [`SimSensor`]
//! share one [`SimulatedRig`] and plug into the control loop in place of the
//! PWM outputs and the magnetometer.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::actuator::{ActuatorMapper, DriveChannel, DutyOutput, DutyPair};
use crate::error::RigResult;
use crate::sensor::{BootClock, OrientationSensor};

/// Physics integration step.
pub const PHYSICS_STEP_MICROS: u64 = 1_000;
/// Sensor report interval, roughly a 50 Hz IMU.
pub const REPORT_INTERVAL_MICROS: u64 = 20_000;
/// Starting angle of the rig in degrees.
pub const START_ANGLE_DEG: f32 = 45.0;

/// Second-order plant: `accel = command * power - damping * velocity`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationalOscillator {
    /// Radians.
    pub angle: f32,
    /// Radians per second.
    pub angular_velocity: f32,
    pub damping: f32,
    pub power: f32,
}

impl RotationalOscillator {
    pub fn new(angle_rad: f32) -> Self {
        Self {
            angle: angle_rad,
            angular_velocity: 0.0,
            damping: 0.1,
            power: 10.0,
        }
    }

    /// Integrate one explicit Euler step of `dt` seconds.
    pub fn update(&mut self, command: f32, dt: f32) -> f32 {
        let acceleration = command * self.power - self.damping * self.angular_velocity;
        self.angular_velocity += acceleration * dt;
        self.angle += self.angular_velocity * dt;
        self.angle
    }
}

/// Sensor noise: per-read jitter plus a slowly wandering bias.
#[derive(Debug, Clone)]
pub struct NoisySensor {
    jitter: f32,
    drift: f32,
    bias: f32,
    rng: StdRng,
}

impl NoisySensor {
    pub fn new(jitter: f32, drift: f32, seed: u64) -> Self {
        Self {
            jitter,
            drift,
            bias: 0.0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// No noise at all.
    pub fn ideal() -> Self {
        Self::new(0.0, 0.0, 0)
    }

    pub fn read(&mut self, true_value: f32) -> f32 {
        self.bias += symmetric(&mut self.rng, self.drift);
        true_value + self.bias + symmetric(&mut self.rng, self.jitter)
    }
}

fn symmetric(rng: &mut StdRng, amplitude: f32) -> f32 {
    if amplitude > 0.0 {
        rng.gen_range(-amplitude..amplitude)
    } else {
        0.0
    }
}

/// Plant, sensor model and the command currently applied.
#[derive(Debug, Clone)]
pub struct SimulatedRig {
    oscillator: RotationalOscillator,
    sensor: NoisySensor,
    command: f32,
    sim_time_micros: u64,
    next_report_micros: u64,
}

impl Default for SimulatedRig {
    fn default() -> Self {
        Self::new(NoisySensor::new(0.05, 0.0001, 0x5EED))
    }
}

impl SimulatedRig {
    pub fn new(sensor: NoisySensor) -> Self {
        Self {
            oscillator: RotationalOscillator::new(START_ANGLE_DEG.to_radians()),
            sensor,
            command: 0.0,
            sim_time_micros: 0,
            next_report_micros: 0,
        }
    }

    /// Wrap for sharing between a [`SimSensor`] and a [`SimActuator`].
    pub fn shared(self) -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(self))
    }

    pub fn oscillator(&self) -> &RotationalOscillator {
        &self.oscillator
    }

    pub fn command(&self) -> f32 {
        self.command
    }

    pub fn set_command(&mut self, command: f32) {
        self.command = command;
    }

    /// True angle in degrees.
    pub fn angle_deg(&self) -> f32 {
        self.oscillator.angle.to_degrees()
    }

    /// Run the physics up to `now_micros` in fixed steps.
    pub fn advance_to(&mut self, now_micros: u64) {
        let dt = PHYSICS_STEP_MICROS as f32 / 1_000_000.0;
        while self.sim_time_micros + PHYSICS_STEP_MICROS <= now_micros {
            self.oscillator.update(self.command, dt);
            self.sim_time_micros += PHYSICS_STEP_MICROS;
        }
    }

    /// Advance to `now_micros` and return a reading in degrees if one is due.
    pub fn poll(&mut self, now_micros: u64) -> Option<f32> {
        self.advance_to(now_micros);
        if now_micros < self.next_report_micros {
            return None;
        }
        self.next_report_micros = now_micros + REPORT_INTERVAL_MICROS;
        let measured = self.sensor.read(self.oscillator.angle);
        Some(measured.to_degrees())
    }
}

fn lock(rig: &Mutex<SimulatedRig>) -> MutexGuard<'_, SimulatedRig> {
    rig.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Orientation sensor reading from the simulated rig.
pub struct SimSensor {
    rig: Arc<Mutex<SimulatedRig>>,
    clock: BootClock,
    angle: f32,
}

impl SimSensor {
    pub fn new(rig: Arc<Mutex<SimulatedRig>>, clock: BootClock) -> Self {
        Self {
            rig,
            clock,
            angle: 0.0,
        }
    }
}

impl OrientationSensor for SimSensor {
    fn poll_event(&mut self) -> bool {
        match lock(&self.rig).poll(self.clock.micros()) {
            Some(angle) => {
                self.angle = angle;
                true
            }
            None => false,
        }
    }

    fn current_angle(&self) -> f32 {
        self.angle
    }
}

/// Duty output that turns channel duties back into a plant command.
pub struct SimActuator {
    rig: Arc<Mutex<SimulatedRig>>,
    mapper: ActuatorMapper,
    duties: DutyPair,
}

impl SimActuator {
    pub fn new(rig: Arc<Mutex<SimulatedRig>>, mapper: ActuatorMapper) -> Self {
        Self {
            rig,
            duties: mapper.parked(),
            mapper,
        }
    }

    pub fn duties(&self) -> DutyPair {
        self.duties
    }
}

impl DutyOutput for SimActuator {
    fn set_duty(&mut self, channel: DriveChannel, duty: u32) -> RigResult<()> {
        match channel {
            DriveChannel::A => self.duties.a = duty,
            DriveChannel::B => self.duties.b = duty,
        }
        let command = self.mapper.command_from_duties(self.duties);
        lock(&self.rig).set_command(command);
        debug!(%channel, duty, command, "simulated duty");
        Ok(())
    }
}
