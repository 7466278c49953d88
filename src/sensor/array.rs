use super::Sensor;
use crate::error::{ControlError, ControlResult};

/// Mean of several probes read as one process value.
///
/// If any probe is unavailable the whole reading is: a partial mean would
/// shift the process value every time one probe drops out.
pub struct ThermometerArray {
    name: String,
    sensors: Vec<Box<dyn Sensor + Send>>,
}

impl ThermometerArray {
    pub fn new(sensors: Vec<Box<dyn Sensor + Send>>) -> ControlResult<Self> {
        if sensors.is_empty() {
            return Err(ControlError::invalid("thermometer array needs at least one sensor"));
        }
        let name = format!("array[{}]", sensors.iter().map(|s| s.name()).collect::<Vec<_>>().join(", "));
        Ok(Self { name, sensors })
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }
}

impl Sensor for ThermometerArray {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self) -> ControlResult<f64> {
        let mut sum = 0.0;
        for sensor in self.sensors.iter_mut() {
            sum += sensor.read()?;
        }
        Ok(sum / self.sensors.len() as f64)
    }
}
