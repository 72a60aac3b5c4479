// This file is only compiled during tests

use crate::actuator::{DriveChannel, DutyOutput, DutyPair};
use crate::error::RigResult;

/// Duty output that remembers every write.
#[derive(Debug, Default)]
pub struct RecordingOutput {
    pub writes: Vec<(DriveChannel, u32)>,
}

impl RecordingOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last duty written to each channel.
    pub fn last(&self) -> Option<DutyPair> {
        let a = self.last_for(DriveChannel::A)?;
        let b = self.last_for(DriveChannel::B)?;
        Some(DutyPair { a, b })
    }

    fn last_for(&self, channel: DriveChannel) -> Option<u32> {
        self.writes
            .iter()
            .rev()
            .find(|(ch, _)| *ch == channel)
            .map(|(_, duty)| *duty)
    }
}

impl DutyOutput for RecordingOutput {
    fn set_duty(&mut self, channel: DriveChannel, duty: u32) -> RigResult<()> {
        self.writes.push((channel, duty));
        Ok(())
    }
}
