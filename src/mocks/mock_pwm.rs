// This file is only compiled during tests

use std::cell::RefCell;
use std::collections::HashMap;

use rppal::pwm::Error;

#[derive(Debug, Clone, Copy, Default)]
struct PinState {
    duty_cycle: f64,
    disabled: bool,
}

thread_local! {
    static MOCK_PWM: RefCell<HashMap<u8, PinState>> = RefCell::new(HashMap::new());
}

pub struct Pwm {
    pin: u8,
}

impl Pwm {
    pub fn new(pin: u8) -> Result<Self, Error> {
        MOCK_PWM.with(|pins| {
            pins.borrow_mut().insert(pin, PinState::default());
        });
        Ok(Pwm { pin })
    }

    pub fn set_duty_cycle(&self, duty_cycle: f64) -> Result<(), Error> {
        MOCK_PWM.with(|pins| {
            pins.borrow_mut().entry(self.pin).or_default().duty_cycle = duty_cycle;
        });
        Ok(())
    }

    pub fn disable(&self) -> Result<(), Error> {
        MOCK_PWM.with(|pins| {
            pins.borrow_mut().entry(self.pin).or_default().disabled = true;
        });
        Ok(())
    }
}

// Test helpers
pub fn get_mock_duty_cycle(pin: u8) -> Option<f64> {
    MOCK_PWM.with(|pins| pins.borrow().get(&pin).map(|state| state.duty_cycle))
}

pub fn is_mock_disabled(pin: u8) -> bool {
    MOCK_PWM.with(|pins| pins.borrow().get(&pin).is_some_and(|state| state.disabled))
}

pub fn reset_mock_pwm() {
    MOCK_PWM.with(|pins| {
        pins.borrow_mut().clear();
    });
}
