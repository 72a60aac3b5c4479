// ** ACTUATOR CONFIGURATION ** //

/// GPIO pins driving the two ESC inputs.
/// - GPIO 13 (PWM1) drives channel A (positive commands)
/// - GPIO 12 (PWM0) drives channel B (negative commands)
pub const MOTOR_A_PIN: u8 = 13;
pub const MOTOR_B_PIN: u8 = 12;
/// ESC control signal frequency (Hz)
pub const PWM_FREQUENCY_HZ: f32 = 50.0;
/// Duty resolution in bits, duty values span 0..=2^bits - 1
pub const PWM_RESOLUTION_BITS: u32 = 16;
/// ESC pulse width range (microseconds)
/// 1000μs keeps the ESC armed at idle, 2000μs is full throttle
pub const PULSE_MIN_US: f32 = 1000.0;
pub const PULSE_MAX_US: f32 = 2000.0;
/// How long both channels sit at the armed minimum before the loop starts.
pub const ESC_ARMING_DELAY_MS: u64 = 2000;

// ** SENSOR CONFIGURATION ** //

/// No fresh reading for this long parks the actuator.
pub const SENSOR_STALE_AFTER_MICROS: u64 = 100_000;
/// A bounded sensor read polls this many times...
pub const SENSOR_POLL_ATTEMPTS: usize = 5;
/// ...with this delay between polls.
pub const SENSOR_POLL_DELAY_MS: u64 = 2;

/// Magnetometer hard-iron offsets (raw counts), (min + max) / 2 per axis
/// from a full rotation of the rig.
pub const MAG_X_OFFSET: f32 = 0.0;
pub const MAG_Y_OFFSET: f32 = 0.0;

// ** CALIBRATION CONFIGURATION ** //

pub const CALIBRATION_SAMPLES: u16 = 200;
pub const CALIBRATION_SPACING_MICROS: u64 = 10_000;

// ** CONTROL CONFIGURATION ** //

/// Default controller gains at boot.
pub const DEFAULT_GAIN_P: f32 = 0.2;
pub const DEFAULT_GAIN_I: f32 = 0.1;
pub const DEFAULT_GAIN_D: f32 = 0.05;
/// Smallest dt (seconds) the PID derivative divides by.
pub const MIN_DERIVATIVE_DT_SECS: f32 = 1e-6;
/// Default pause between control ticks.
pub const TICK_PERIOD_MICROS: u64 = 1000;

// ** TELEMETRY CONFIGURATION ** //

pub const TELEMETRY_CAPACITY: usize = 1500;

// ** REMOTE CONFIGURATION ** //

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:80";
