// Use rppal in production
#[cfg(not(test))]
use rppal::pwm::{Channel, Polarity, Pwm};

// Mock PWM for testing
#[cfg(test)]
use crate::mocks::mock_pwm::Pwm;

use tracing::{info, warn};

use crate::actuator::{ActuatorMapper, DriveChannel, DutyOutput, PwmTiming};
use crate::config::{MOTOR_A_PIN, MOTOR_B_PIN};
use crate::error::{RigError, RigResult};

/// Hardware PWM is available on:
/// - GPIO 12 (PWM0)
/// - GPIO 13 (PWM1)
/// - GPIO 18 (PWM0)
/// - GPIO 19 (PWM1)
fn pwm_index(pin: u8) -> RigResult<u8> {
    match pin {
        12 | 18 => Ok(0),
        13 | 19 => Ok(1),
        _ => Err(RigError::InvalidPwmPin { pin }),
    }
}

/// Two ESC inputs driven by Raspberry Pi hardware PWM.
pub struct PwmActuator {
    channel_a: Pwm,
    channel_b: Pwm,
    max_duty: u32,
}

impl PwmActuator {
    /// Open both drive channels on the default pins.
    pub fn new(mapper: &ActuatorMapper) -> RigResult<Self> {
        Self::with_pins(MOTOR_A_PIN, MOTOR_B_PIN, mapper)
    }

    /// Open both drive channels on custom GPIO pins.
    ///
    /// Both outputs start enabled at the armed-minimum duty.
    pub fn with_pins(pin_a: u8, pin_b: u8, mapper: &ActuatorMapper) -> RigResult<Self> {
        let a = pwm_index(pin_a)?;
        let b = pwm_index(pin_b)?;
        if a == b {
            return Err(RigError::SharedPwmChannel { pin_a, pin_b });
        }

        let timing = mapper.timing();
        let idle = mapper.armed_minimum() as f64 / timing.max_duty() as f64;
        let channel_a = open_channel(a, pin_a, timing, idle)?;
        let channel_b = open_channel(b, pin_b, timing, idle)?;

        info!(pin_a, pin_b, frequency_hz = timing.frequency_hz, "PWM outputs enabled");
        Ok(Self {
            channel_a,
            channel_b,
            max_duty: timing.max_duty(),
        })
    }

    /// Disable both PWM outputs.
    pub fn disable(&mut self) -> RigResult<()> {
        self.channel_a.disable()?;
        self.channel_b.disable()?;
        Ok(())
    }

    fn output(&self, channel: DriveChannel) -> &Pwm {
        match channel {
            DriveChannel::A => &self.channel_a,
            DriveChannel::B => &self.channel_b,
        }
    }
}

#[cfg(not(test))]
fn open_channel(index: u8, _pin: u8, timing: &PwmTiming, duty_cycle: f64) -> RigResult<Pwm> {
    let channel = if index == 0 { Channel::Pwm0 } else { Channel::Pwm1 };
    Ok(Pwm::with_frequency(
        channel,
        timing.frequency_hz as f64,
        duty_cycle,
        Polarity::Normal,
        true, // enabled
    )?)
}

#[cfg(test)]
fn open_channel(_index: u8, pin: u8, _timing: &PwmTiming, duty_cycle: f64) -> RigResult<Pwm> {
    let pwm = Pwm::new(pin)?;
    pwm.set_duty_cycle(duty_cycle)?;
    Ok(pwm)
}

impl DutyOutput for PwmActuator {
    fn set_duty(&mut self, channel: DriveChannel, duty: u32) -> RigResult<()> {
        let duty_cycle = duty.min(self.max_duty) as f64 / self.max_duty as f64;
        self.output(channel).set_duty_cycle(duty_cycle)?;
        Ok(())
    }
}

impl Drop for PwmActuator {
    fn drop(&mut self) {
        // Ensure PWM is disabled when dropped
        if let Err(e) = self.disable() {
            warn!("failed to disable PWM outputs: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::mock_pwm;

    #[test]
    fn test_starts_at_armed_minimum() -> RigResult<()> {
        mock_pwm::reset_mock_pwm();
        let mapper = ActuatorMapper::default();

        let _actuator = PwmActuator::new(&mapper)?;

        let expected = 3277.0 / 65535.0;
        assert_eq!(mock_pwm::get_mock_duty_cycle(MOTOR_A_PIN), Some(expected));
        assert_eq!(mock_pwm::get_mock_duty_cycle(MOTOR_B_PIN), Some(expected));
        Ok(())
    }

    #[test]
    fn test_set_duty_routes_to_channel_pin() -> RigResult<()> {
        mock_pwm::reset_mock_pwm();
        let mapper = ActuatorMapper::default();

        let mut actuator = PwmActuator::with_pins(18, 19, &mapper)?;
        actuator.set_duty(DriveChannel::A, 65535)?;
        actuator.set_duty(DriveChannel::B, 0)?;

        assert_eq!(mock_pwm::get_mock_duty_cycle(18), Some(1.0));
        assert_eq!(mock_pwm::get_mock_duty_cycle(19), Some(0.0));
        Ok(())
    }

    #[test]
    fn test_invalid_pins() {
        mock_pwm::reset_mock_pwm();
        let mapper = ActuatorMapper::default();

        assert!(matches!(
            PwmActuator::with_pins(4, 12, &mapper),
            Err(RigError::InvalidPwmPin { pin: 4 })
        ));
        // GPIO 12 and 18 are both PWM0
        assert!(matches!(
            PwmActuator::with_pins(12, 18, &mapper),
            Err(RigError::SharedPwmChannel { .. })
        ));
    }

    #[test]
    fn test_drop_disables_outputs() -> RigResult<()> {
        mock_pwm::reset_mock_pwm();
        let mapper = ActuatorMapper::default();

        let actuator = PwmActuator::new(&mapper)?;
        assert!(!mock_pwm::is_mock_disabled(MOTOR_A_PIN));
        drop(actuator);

        assert!(mock_pwm::is_mock_disabled(MOTOR_A_PIN));
        assert!(mock_pwm::is_mock_disabled(MOTOR_B_PIN));
        Ok(())
    }
}
