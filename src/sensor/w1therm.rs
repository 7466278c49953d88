//! DS18x20 thermometers on the Linux 1-wire bus
//!
//! The kernel exposes each probe as a `w1_slave` file with two lines:
//!
//! ```text
//! 72 01 4b 46 7f ff 0e 10 57 : crc=57 YES
//! 72 01 4b 46 7f ff 0e 10 57 t=23125
//! ```
//!
//! The first line carries the CRC verdict, the second the temperature in
//! milli-degrees Celsius.

use std::fs;
use std::path::{Path, PathBuf};

use super::Sensor;
use crate::error::{ControlError, ControlResult};

pub const W1_DEVICES: &str = "/sys/bus/w1/devices";

pub struct W1Thermometer {
    name: String,
    path: PathBuf,
}

impl W1Thermometer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            name: format!("w1:{}", path.display()),
            path,
        }
    }

    /// Probe by bus id, e.g. `28-00000677dffa`.
    pub fn from_device_id(id: &str) -> Self {
        Self::new(Path::new(W1_DEVICES).join(id).join("w1_slave"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn unavailable(&self, reason: impl Into<String>) -> ControlError {
        ControlError::SensorUnavailable {
            sensor: self.name.clone(),
            reason: reason.into(),
        }
    }
}

impl Sensor for W1Thermometer {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self) -> ControlResult<f64> {
        let contents = fs::read_to_string(&self.path).map_err(|e| self.unavailable(e.to_string()))?;
        parse_w1_slave(&contents).map_err(|reason| self.unavailable(reason))
    }
}

/// Temperature in °C from the contents of a `w1_slave` file.
pub fn parse_w1_slave(contents: &str) -> Result<f64, String> {
    let mut lines = contents.lines();
    let crc_line = lines.next().ok_or("empty w1_slave file")?;
    if !crc_line.trim_end().ends_with("YES") {
        return Err(format!("CRC check failed: {}", crc_line.trim()));
    }

    let data_line = lines.next().ok_or("missing temperature line")?;
    let (_, raw) = data_line
        .rsplit_once("t=")
        .ok_or_else(|| format!("no temperature field in {:?}", data_line.trim()))?;
    let milli: i64 = raw
        .trim()
        .parse()
        .map_err(|_| format!("bad temperature value {:?}", raw.trim()))?;
    Ok(milli as f64 / 1000.0)
}
