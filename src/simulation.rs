//! Simulated heater plant - stands in for the thermometers and the PWM heater

use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

use crate::actuator::Actuator;
use crate::error::{ControlError, ControlResult};
use crate::sensor::Sensor;

// ============================================================================
// THERMAL PLANT - first-order heater model
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlantConfig {
    pub ambient: f64,
    /// Steady-state temperature rise above ambient at 100 % duty.
    pub heating_span: f64,
    /// Thermal time constant in seconds.
    pub time_constant_s: f64,
    pub noise_amplitude: f64,
    pub seed: u64,
    /// Probability that a thermometer read drops out.
    pub dropout: f64,
    /// Probability that a heater write is refused as busy.
    pub busy: f64,
}

impl Default for PlantConfig {
    fn default() -> Self {
        Self {
            ambient: 22.0,
            heating_span: 20.0,
            time_constant_s: 30.0,
            noise_amplitude: 0.02,
            seed: 42,
            dropout: 0.0,
            busy: 0.0,
        }
    }
}

impl PlantConfig {
    pub fn validate(&self) -> ControlResult<()> {
        if !self.ambient.is_finite() || !self.heating_span.is_finite() {
            return Err(ControlError::invalid("plant ambient and heating span must be finite"));
        }
        if !(self.time_constant_s.is_finite() && self.time_constant_s > 0.0) {
            return Err(ControlError::invalid(format!(
                "plant time constant must be positive, got {}",
                self.time_constant_s
            )));
        }
        if !(self.noise_amplitude.is_finite() && self.noise_amplitude >= 0.0) {
            return Err(ControlError::invalid(format!(
                "plant noise amplitude must be a non-negative number, got {}",
                self.noise_amplitude
            )));
        }
        for (name, probability) in [("dropout", self.dropout), ("busy", self.busy)] {
            if !(0.0..=1.0).contains(&probability) {
                return Err(ControlError::invalid(format!(
                    "plant {name} probability must lie in [0, 1], got {probability}"
                )));
            }
        }
        Ok(())
    }
}

pub struct ThermalPlant {
    config: PlantConfig,
    rng: StdRng,
    temperature: f64,
    duty: f64,
}

pub type SharedPlant = Arc<Mutex<ThermalPlant>>;

impl ThermalPlant {
    pub fn new(config: PlantConfig) -> Self {
        Self {
            rng: StdRng::seed_from_u64(config.seed),
            temperature: config.ambient,
            duty: 0.0,
            config,
        }
    }

    pub fn shared(config: PlantConfig) -> SharedPlant {
        Arc::new(Mutex::new(Self::new(config)))
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn duty(&self) -> f64 {
        self.duty
    }

    pub fn set_duty(&mut self, duty: f64) {
        self.duty = duty.clamp(0.0, 100.0);
    }

    /// Advance the model by `dt_s` seconds at the current duty cycle.
    pub fn step(&mut self, dt_s: f64) {
        let target = self.config.ambient + self.config.heating_span * self.duty / 100.0;
        let alpha = (dt_s / self.config.time_constant_s).clamp(0.0, 1.0);
        self.temperature += (target - self.temperature) * alpha;
    }

    /// Noisy reading of the current temperature.
    pub fn sample(&mut self) -> f64 {
        let amplitude = self.config.noise_amplitude;
        let noise = if amplitude > 0.0 {
            self.rng.gen_range(-amplitude..amplitude)
        } else {
            0.0
        };
        self.temperature + noise
    }

    pub fn inject_disturbance(&mut self, delta: f64) {
        self.temperature += delta;
    }

    fn roll(&mut self, probability: f64) -> bool {
        probability > 0.0 && self.rng.gen_bool(probability.min(1.0))
    }
}

// ============================================================================
// SIMULATED COLLABORATORS
// ============================================================================

pub struct SimulatedThermometer {
    plant: SharedPlant,
}

impl SimulatedThermometer {
    pub fn new(plant: SharedPlant) -> Self {
        Self { plant }
    }
}

impl Sensor for SimulatedThermometer {
    fn name(&self) -> &str {
        "sim-thermometer"
    }

    fn read(&mut self) -> ControlResult<f64> {
        let mut plant = self.plant.lock();
        let dropout = plant.config.dropout;
        if plant.roll(dropout) {
            return Err(ControlError::SensorUnavailable {
                sensor: self.name().to_string(),
                reason: "simulated dropout".to_string(),
            });
        }
        Ok(plant.sample())
    }
}

/// Heater that advances the plant by one tick interval on every write.
pub struct SimulatedHeater {
    plant: SharedPlant,
    dt_s: f64,
}

impl SimulatedHeater {
    pub fn new(plant: SharedPlant, dt_s: f64) -> Self {
        Self { plant, dt_s }
    }
}

impl Actuator for SimulatedHeater {
    fn name(&self) -> &str {
        "sim-heater"
    }

    fn write(&mut self, value: f64) -> ControlResult<()> {
        let mut plant = self.plant.lock();
        let busy = plant.config.busy;
        if plant.roll(busy) {
            return Err(ControlError::ActuatorRejected {
                actuator: self.name().to_string(),
                reason: "simulated busy".to_string(),
            });
        }
        plant.set_duty(value);
        plant.step(self.dt_s);
        Ok(())
    }
}
