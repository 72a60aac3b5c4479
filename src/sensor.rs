//! Orientation sensor seam and freshness tracking.

use std::thread;
use std::time::{Duration, Instant};

use crate::config::{SENSOR_POLL_ATTEMPTS, SENSOR_POLL_DELAY_MS, SENSOR_STALE_AFTER_MICROS};

/// Capability set of the orientation sensor driver.
pub trait OrientationSensor {
    /// Returns `true` if a new reading arrived since the last poll.
    fn poll_event(&mut self) -> bool;

    /// Latest angle in degrees. Only meaningful after `poll_event` returned `true`.
    fn current_angle(&self) -> f32;
}

/// Microseconds since the process booted.
#[derive(Debug, Clone, Copy)]
pub struct BootClock {
    start: Instant,
}

impl BootClock {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn micros(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }
}

/// Wraps a sensor and remembers when it last produced a reading.
pub struct SensorFeed<S> {
    sensor: S,
    angle: f32,
    last_update_micros: Option<u64>,
    stale_after_micros: u64,
}

impl<S: OrientationSensor> SensorFeed<S> {
    pub fn new(sensor: S) -> Self {
        Self {
            sensor,
            angle: 0.0,
            last_update_micros: None,
            stale_after_micros: SENSOR_STALE_AFTER_MICROS,
        }
    }

    /// Poll the sensor once. Returns `true` if a new reading arrived.
    pub fn poll(&mut self, now_micros: u64) -> bool {
        if self.sensor.poll_event() {
            self.angle = self.sensor.current_angle();
            self.last_update_micros = Some(now_micros);
            true
        } else {
            false
        }
    }

    /// Bounded blocking read: poll a fixed number of times with a short delay
    /// in between and return the latest known angle, fresh or not.
    pub fn read_with_retries(&mut self, clock: &BootClock) -> f32 {
        for _ in 0..SENSOR_POLL_ATTEMPTS {
            self.poll(clock.micros());
            thread::sleep(Duration::from_millis(SENSOR_POLL_DELAY_MS));
        }
        self.angle
    }

    /// A feed that never produced a reading is stale.
    pub fn is_fresh(&self, now_micros: u64) -> bool {
        self.last_update_micros
            .is_some_and(|last| now_micros.saturating_sub(last) < self.stale_after_micros)
    }

    /// Latest known angle in degrees.
    pub fn angle(&self) -> f32 {
        self.angle
    }

    pub fn last_update_micros(&self) -> Option<u64> {
        self.last_update_micros
    }

    pub fn sensor(&self) -> &S {
        &self.sensor
    }

    pub fn sensor_mut(&mut self) -> &mut S {
        &mut self.sensor
    }
}
