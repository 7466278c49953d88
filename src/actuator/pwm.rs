//! Heater duty cycle through the Linux sysfs PWM interface

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::Actuator;
use crate::error::{ControlError, ControlResult};

pub const DEFAULT_FREQUENCY_HZ: f64 = 50.0;

pub struct SysfsPwm {
    name: String,
    channel_dir: PathBuf,
    period_ns: u64,
}

impl SysfsPwm {
    /// Export `channel` on `/sys/class/pwm/pwmchip<chip>`, program the period
    /// for `frequency_hz` and enable the output at 0 %.
    pub fn open(chip: u32, channel: u32, frequency_hz: f64) -> ControlResult<Self> {
        Self::open_at(Path::new("/sys/class/pwm").join(format!("pwmchip{chip}")), channel, frequency_hz)
    }

    pub fn open_at(chip_dir: impl AsRef<Path>, channel: u32, frequency_hz: f64) -> ControlResult<Self> {
        if !(frequency_hz.is_finite() && frequency_hz > 0.0) {
            return Err(ControlError::invalid(format!("PWM frequency must be positive, got {frequency_hz}")));
        }
        let chip_dir = chip_dir.as_ref();
        let name = format!("pwm:{}/{}", chip_dir.display(), channel);
        let channel_dir = chip_dir.join(format!("pwm{channel}"));

        if !channel_dir.exists() {
            fs::write(chip_dir.join("export"), channel.to_string()).map_err(|e| transport(&name, e))?;
            // udev needs a moment to fix up permissions on the new channel
            std::thread::sleep(Duration::from_millis(100));
        }

        let period_ns = (1e9 / frequency_hz).round() as u64;
        let pwm = Self {
            name,
            channel_dir,
            period_ns,
        };
        // duty_cycle must never exceed the period, so zero it first
        pwm.write_attr("duty_cycle", "0").map_err(|e| transport(&pwm.name, e))?;
        pwm.write_attr("period", &period_ns.to_string()).map_err(|e| transport(&pwm.name, e))?;
        pwm.write_attr("enable", "1").map_err(|e| transport(&pwm.name, e))?;
        tracing::info!(actuator = %pwm.name, frequency_hz, "PWM channel enabled");
        Ok(pwm)
    }

    pub fn period_ns(&self) -> u64 {
        self.period_ns
    }

    fn write_attr(&self, attr: &str, value: &str) -> io::Result<()> {
        fs::write(self.channel_dir.join(attr), value)
    }
}

impl Actuator for SysfsPwm {
    fn name(&self) -> &str {
        &self.name
    }

    /// `value` is a duty cycle in percent.
    fn write(&mut self, value: f64) -> ControlResult<()> {
        let fraction = (value / 100.0).clamp(0.0, 1.0);
        let duty_ns = (fraction * self.period_ns as f64).round() as u64;
        self.write_attr("duty_cycle", &duty_ns.to_string()).map_err(|e| match e.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted | io::ErrorKind::TimedOut => {
                ControlError::ActuatorRejected {
                    actuator: self.name.clone(),
                    reason: e.to_string(),
                }
            }
            _ => transport(&self.name, e),
        })
    }
}

impl Drop for SysfsPwm {
    fn drop(&mut self) {
        let _ = self.write_attr("duty_cycle", "0");
        let _ = self.write_attr("enable", "0");
    }
}

fn transport(name: &str, source: io::Error) -> ControlError {
    ControlError::Transport {
        collaborator: name.to_string(),
        source,
    }
}
