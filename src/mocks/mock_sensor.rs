// This file is only compiled during tests

use std::collections::VecDeque;

use crate::sensor::OrientationSensor;

/// Sensor that replays a script of polls.
///
/// `Some(angle)` reports a new reading, `None` reports nothing. Once the script
/// runs out every poll behaves like `fallback`.
pub struct ScriptedSensor {
    script: VecDeque<Option<f32>>,
    fallback: Option<f32>,
    angle: f32,
    pub polls: usize,
}

impl ScriptedSensor {
    /// Reports `angle` on every poll.
    pub fn constant(angle: f32) -> Self {
        Self::with_script(Vec::new(), Some(angle))
    }

    /// Never reports a reading.
    pub fn silent() -> Self {
        Self::with_script(Vec::new(), None)
    }

    pub fn with_script(script: Vec<Option<f32>>, fallback: Option<f32>) -> Self {
        Self {
            script: script.into(),
            fallback,
            angle: 0.0,
            polls: 0,
        }
    }

    /// Change what polls report after the script is exhausted.
    pub fn set_fallback(&mut self, fallback: Option<f32>) {
        self.fallback = fallback;
    }
}

impl OrientationSensor for ScriptedSensor {
    fn poll_event(&mut self) -> bool {
        self.polls += 1;
        let next = self.script.pop_front().unwrap_or(self.fallback);
        match next {
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
