//! Actuator module - PID control law and the actuator capability

pub mod controller;
pub mod history;
pub mod pwm;

use crate::error::ControlResult;

/// Something the control loop can drive with a single scalar.
///
/// Values are clamped by the loop to the configured output range before
/// `write` is called.
pub trait Actuator {
    fn name(&self) -> &str;

    fn write(&mut self, value: f64) -> ControlResult<()>;
}

