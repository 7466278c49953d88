//! Sensor module - process value sources for the control loop

pub mod array;
pub mod w1therm;

use crate::error::ControlResult;

/// A process value source.
///
/// A transient dropout is reported as `ControlError::SensorUnavailable`; the
/// loop skips that tick instead of feeding a sentinel into the controller.
pub trait Sensor {
    fn name(&self) -> &str;

    fn read(&mut self) -> ControlResult<f64>;
}
