//! Run configuration - TOML file with CLI overrides applied on top
//!
//! Defaults reproduce the DAVLL heater stabilization: 30 °C setpoint,
//! P = 20, I = 2.5, D = 1e-6 over a 25-sample history, 50 Hz heater PWM.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::actuator::controller::PidConfig;
use crate::actuator::pwm::DEFAULT_FREQUENCY_HZ;
use crate::driver::regime::RegimeConfig;
use crate::driver::LoopConfig;
use crate::error::{ControlError, ControlResult};
use crate::simulation::PlantConfig;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub setpoint: f64,
    #[serde(rename = "loop")]
    pub control: LoopConfig,
    pub pid: PidConfig,
    pub regime: RegimeConfig,
    pub log: LogConfig,
    pub hardware: HardwareConfig,
    pub simulation: SimulationConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            setpoint: 30.0,
            control: LoopConfig::default(),
            pid: PidConfig {
                p: 20.0,
                i: 2.5,
                d: 1e-6,
                history_size: 25,
                ..PidConfig::default()
            },
            regime: RegimeConfig::default(),
            log: LogConfig::default(),
            hardware: HardwareConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    pub path: Option<PathBuf>,
    /// Append error and term breakdown columns.
    pub extended: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            path: Some(PathBuf::from("data/DAVLL_HEAT.dat")),
            extended: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HardwareConfig {
    /// 1-wire device ids, averaged into one process value.
    pub thermometers: Vec<String>,
    pub pwm_chip: u32,
    pub pwm_channel: u32,
    pub pwm_frequency_hz: f64,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            thermometers: vec![
                "28-00000677dffa".to_string(),
                "28-00000695373a".to_string(),
                "28-000006955314".to_string(),
            ],
            pwm_chip: 0,
            pwm_channel: 0,
            pwm_frequency_hz: DEFAULT_FREQUENCY_HZ,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    pub enabled: bool,
    pub plant: PlantConfig,
}

impl RunConfig {
    pub fn from_toml(text: &str) -> ControlResult<Self> {
        let config: RunConfig =
            toml::from_str(text).map_err(|e| ControlError::invalid(format!("config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path`; a missing file yields the defaults, anything unreadable
    /// or invalid is a configuration error.
    pub fn load(path: impl AsRef<Path>) -> ControlResult<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(ControlError::invalid(format!("cannot read {}: {}", path.display(), e))),
        }
    }

    pub fn validate(&self) -> ControlResult<()> {
        if !self.setpoint.is_finite() {
            return Err(ControlError::invalid(format!("setpoint must be finite, got {}", self.setpoint)));
        }
        self.pid.validate()?;
        self.control.validate()?;
        if !(self.regime.derivative_band.is_finite() && self.regime.derivative_band >= 0.0) {
            return Err(ControlError::invalid("regime derivative band must be a non-negative number"));
        }
        if self.simulation.enabled {
            self.simulation.plant.validate()?;
        }
        if !self.simulation.enabled && self.hardware.thermometers.is_empty() {
            return Err(ControlError::invalid("no thermometers configured"));
        }
        Ok(())
    }
}
