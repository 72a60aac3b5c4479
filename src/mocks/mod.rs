// This module is only compiled during tests

pub mod mock_output;
pub mod mock_pwm;
pub mod mock_sensor;
