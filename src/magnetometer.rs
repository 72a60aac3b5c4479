//! LIS3MDL magnetometer used as the orientation sensor.

use rppal::i2c::I2c;

use tracing::{debug, info};

use crate::config::{MAG_X_OFFSET, MAG_Y_OFFSET};
use crate::error::{RigError, RigResult};
use crate::sensor::OrientationSensor;

pub const LIS3MDL_ADDR: u16 = 0x1C;
const LIS3MDL_ID: u8 = 0x3D;

// LIS3MDL Register addresses
const WHO_AM_I: u8 = 0x0F;
const CTRL_REG1: u8 = 0x20;
const CTRL_REG2: u8 = 0x21;
const CTRL_REG3: u8 = 0x22;
const CTRL_REG4: u8 = 0x23;
const CTRL_REG5: u8 = 0x24;
const STATUS_REG: u8 = 0x27;
const OUT_X_L: u8 = 0x28;

/// STATUS_REG bit set when a new X/Y/Z sample is ready.
const ZYXDA: u8 = 0x08;

/// Angle of the horizontal field vector in degrees, in `(-180, 180]`.
pub fn angle_from_axes(x: f32, y: f32) -> f32 {
    let angle = y.atan2(x).to_degrees();
    // atan2 returns -180 for (-x, -0.0)
    if angle <= -180.0 { angle + 360.0 } else { angle }
}

/// Decode little-endian X and Y from the first four output bytes.
fn axes_from_bytes(data: &[u8; 6]) -> (f32, f32) {
    let x = i16::from_le_bytes([data[0], data[1]]) as f32;
    let y = i16::from_le_bytes([data[2], data[3]]) as f32;
    (x, y)
}

/// Hard-iron correction subtracted from the raw axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HardIronOffsets {
    pub x: f32,
    pub y: f32,
}

impl Default for HardIronOffsets {
    fn default() -> Self {
        Self {
            x: MAG_X_OFFSET,
            y: MAG_Y_OFFSET,
        }
    }
}

impl HardIronOffsets {
    fn corrected_angle(&self, x: f32, y: f32) -> f32 {
        angle_from_axes(x - self.x, y - self.y)
    }
}

pub struct MagnetometerSensor {
    i2c: I2c,
    offsets: HardIronOffsets,
    angle: f32,
}

impl MagnetometerSensor {
    pub fn new() -> RigResult<Self> {
        Self::with_offsets(HardIronOffsets::default())
    }

    pub fn with_offsets(offsets: HardIronOffsets) -> RigResult<Self> {
        let mut i2c = I2c::new()?;
        i2c.set_slave_address(LIS3MDL_ADDR)?;

        let found = i2c.smbus_read_byte(WHO_AM_I)?;
        if found != LIS3MDL_ID {
            return Err(RigError::WrongDeviceId {
                found,
                expected: LIS3MDL_ID,
            });
        }

        // Ultra-high performance X/Y, ODR 80 Hz
        i2c.smbus_write_byte(CTRL_REG1, 0xFC)?;
        // ±4 gauss
        i2c.smbus_write_byte(CTRL_REG2, 0x00)?;
        // Continuous conversion
        i2c.smbus_write_byte(CTRL_REG3, 0x00)?;
        // Ultra-high performance Z, little endian
        i2c.smbus_write_byte(CTRL_REG4, 0x0C)?;
        // Block data update
        i2c.smbus_write_byte(CTRL_REG5, 0x40)?;

        std::thread::sleep(std::time::Duration::from_millis(100));

        if i2c.smbus_read_byte(STATUS_REG)? == 0 {
            return Err(RigError::SensorNotResponding);
        }

        info!(address = LIS3MDL_ADDR, "magnetometer (LIS3MDL) initialized");
        Ok(Self {
            i2c,
            offsets,
            angle: 0.0,
        })
    }

    /// Read one sample if the device has one ready.
    fn read_sample(&mut self) -> RigResult<Option<f32>> {
        let status = self.i2c.smbus_read_byte(STATUS_REG)?;
        if status & ZYXDA == 0 {
            return Ok(None);
        }

        let mut data = [0u8; 6];
        for (i, byte) in data.iter_mut().enumerate() {
            *byte = self.i2c.smbus_read_byte(OUT_X_L + i as u8)?;
        }
        let (x, y) = axes_from_bytes(&data);
        Ok(Some(self.offsets.corrected_angle(x, y)))
    }
}

impl OrientationSensor for MagnetometerSensor {
    fn poll_event(&mut self) -> bool {
        match self.read_sample() {
            Ok(Some(angle)) => {
                self.angle = angle;
                true
            }
            Ok(None) => false,
            Err(e) => {
                debug!(error = %e, "magnetometer read failed");
                false
            }
        }
    }

    fn current_angle(&self) -> f32 {
        self.angle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f32, expected: f32) {
        assert!((actual - expected).abs() < 1e-4, "{actual} != {expected}");
    }

    #[test]
    fn test_cardinal_angles() {
        assert_close(angle_from_axes(1.0, 0.0), 0.0);
        assert_close(angle_from_axes(0.0, 1.0), 90.0);
        assert_close(angle_from_axes(0.0, -1.0), -90.0);
        assert_close(angle_from_axes(-1.0, 0.0), 180.0);
        assert_close(angle_from_axes(-1.0, -0.0), 180.0);
    }

    #[test]
    fn test_decodes_little_endian_axes() {
        // x = 0x0102 = 258, y = -2 (0xFFFE), z ignored
        let data = [0x02, 0x01, 0xFE, 0xFF, 0x55, 0x55];
        assert_eq!(axes_from_bytes(&data), (258.0, -2.0));
    }

    #[test]
    fn test_offsets_recenter_axes() {
        let offsets = HardIronOffsets { x: 100.0, y: -50.0 };
        assert_close(offsets.corrected_angle(100.0, 0.0), 90.0);
        assert_close(HardIronOffsets::default().corrected_angle(0.0, 3.0), 90.0);
    }

    #[test]
    fn test_diagonal() {
        let (x, y) = axes_from_bytes(&[0x10, 0x00, 0x10, 0x00, 0, 0]);
        assert_close(angle_from_axes(x, y), 45.0);
    }
}
