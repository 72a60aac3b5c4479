//! Error types for the rig control core.

use thiserror::Error;

/// Result type for rig operations.
pub type RigResult<T> = Result<T, RigError>;

/// Errors raised by hardware backends and the remote server.
///
/// The control math itself never fails: bad numbers are clamped or defaulted.
#[derive(Debug, Error)]
pub enum RigError {
    /// PWM peripheral rejected a request.
    #[error("PWM error: {0}")]
    Pwm(#[from] rppal::pwm::Error),

    /// I2C bus error while talking to the orientation sensor.
    #[error("I2C error: {0}")]
    I2c(#[from] rppal::i2c::Error),

    /// GPIO pin has no hardware PWM channel.
    #[error("GPIO {pin} has no hardware PWM channel, use 12, 13, 18 or 19")]
    InvalidPwmPin { pin: u8 },

    /// Both drive channels resolved to the same PWM channel.
    #[error("GPIO {pin_a} and GPIO {pin_b} share a PWM channel")]
    SharedPwmChannel { pin_a: u8, pin_b: u8 },

    /// Sensor answered with an unexpected WHO_AM_I value.
    #[error("wrong sensor device id: 0x{found:02X}, expected 0x{expected:02X}")]
    WrongDeviceId { found: u8, expected: u8 },

    /// Sensor never reported data after configuration.
    #[error("orientation sensor not responding (no data ready)")]
    SensorNotResponding,

    /// The remote surface thread panicked.
    #[error("remote surface thread panicked")]
    ServerPanicked,

    /// Socket or terminal I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
