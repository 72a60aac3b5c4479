//! Calibration of the controller's reference point.
//!
//! The operator parks the rig at its low and high extremes; each extreme is the
//! average of [`CALIBRATION_SAMPLES`] sensor readings spaced
//! [`CALIBRATION_SPACING_MICROS`] apart. The middle of the two becomes the setpoint.
//!
//! Inside the control loop a run advances one sample at a time through
//! [`Calibrator::advance`], so it never stalls the loop. [`record_blocking`] does
//! the same collection in one call for the standalone calibration tool.

use std::fmt;
use std::thread;
use std::time::Duration;

use serde::Serialize;

use crate::config::{CALIBRATION_SAMPLES, CALIBRATION_SPACING_MICROS};
use crate::sensor::{BootClock, OrientationSensor, SensorFeed};

/// Which extreme a calibration run records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CalibrationSide {
    Low,
    High,
}

impl fmt::Display for CalibrationSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationSide::Low => write!(f, "low"),
            CalibrationSide::High => write!(f, "high"),
        }
    }
}

/// Recorded extremes and the derived reference point.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct CalibrationState {
    pub low: f32,
    pub high: f32,
    pub middle: f32,
}

impl CalibrationState {
    pub fn from_extremes(low: f32, high: f32) -> Self {
        Self {
            low,
            high,
            middle: (low + high) / 2.0,
        }
    }

    /// Store one extreme and recompute the middle. Values are not range checked.
    pub fn record(&mut self, side: CalibrationSide, value: f32) {
        match side {
            CalibrationSide::Low => self.low = value,
            CalibrationSide::High => self.high = value,
        }
        self.middle = (self.low + self.high) / 2.0;
    }

    pub fn record_low(&mut self, value: f32) {
        self.record(CalibrationSide::Low, value);
    }

    pub fn record_high(&mut self, value: f32) {
        self.record(CalibrationSide::High, value);
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct SampleAccumulator {
    sum: f32,
    count: u16,
}

impl SampleAccumulator {
    fn push(&mut self, sample: f32) {
        self.sum += sample;
        self.count += 1;
    }

    fn average(&self) -> f32 {
        self.sum / self.count as f32
    }
}

#[derive(Debug, Clone, Copy)]
struct CalibrationRun {
    side: CalibrationSide,
    samples: SampleAccumulator,
    next_sample_micros: u64,
}

/// Result of advancing a calibration run by one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CalibrationProgress {
    /// Still collecting.
    Collecting {
        side: CalibrationSide,
        samples_collected: u16,
    },
    /// All samples collected.
    Finished { side: CalibrationSide, average: f32 },
}

/// Non-blocking sample collector driven by the control loop.
#[derive(Debug, Clone)]
pub struct Calibrator {
    run: Option<CalibrationRun>,
    sample_count: u16,
    spacing_micros: u64,
}

impl Default for Calibrator {
    fn default() -> Self {
        Self::new(CALIBRATION_SAMPLES, CALIBRATION_SPACING_MICROS)
    }
}

impl Calibrator {
    pub fn new(sample_count: u16, spacing_micros: u64) -> Self {
        Self {
            run: None,
            sample_count: sample_count.max(1),
            spacing_micros,
        }
    }

    /// Start collecting for `side`. The first sample is taken on the next advance.
    ///
    /// Returns `false` if a run is already in progress; runs cannot be cancelled.
    pub fn begin(&mut self, side: CalibrationSide, now_micros: u64) -> bool {
        if self.run.is_some() {
            return false;
        }
        self.run = Some(CalibrationRun {
            side,
            samples: SampleAccumulator::default(),
            next_sample_micros: now_micros,
        });
        true
    }

    pub fn is_active(&self) -> bool {
        self.run.is_some()
    }

    pub fn active_side(&self) -> Option<CalibrationSide> {
        self.run.map(|run| run.side)
    }

    /// Take `reading` as a sample if the spacing has elapsed.
    ///
    /// Returns `None` when no run is active.
    pub fn advance(&mut self, now_micros: u64, reading: f32) -> Option<CalibrationProgress> {
        let run = self.run.as_mut()?;

        if now_micros >= run.next_sample_micros {
            run.samples.push(reading);
            run.next_sample_micros = now_micros + self.spacing_micros;
        }

        if run.samples.count >= self.sample_count {
            let side = run.side;
            let average = run.samples.average();
            self.run = None;
            return Some(CalibrationProgress::Finished { side, average });
        }

        Some(CalibrationProgress::Collecting {
            side: run.side,
            samples_collected: run.samples.count,
        })
    }
}

/// Collect a full calibration run in one blocking call (about two seconds).
///
/// Each sample is a bounded sensor read; the returned average is not written
/// anywhere, the caller records it.
pub fn record_blocking<S: OrientationSensor>(feed: &mut SensorFeed<S>, clock: &BootClock) -> f32 {
    let mut samples = SampleAccumulator::default();
    for _ in 0..CALIBRATION_SAMPLES {
        samples.push(feed.read_with_retries(clock));
        thread::sleep(Duration::from_micros(CALIBRATION_SPACING_MICROS));
    }
    samples.average()
}
