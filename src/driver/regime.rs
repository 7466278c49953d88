//! Above/below-setpoint switching of the I and D terms
//!
//! Below the setpoint the integral drives the heater up and the derivative is
//! off. Once the process reaches the setpoint the integral is frozen (disabled,
//! its history kept) and the derivative is only enabled inside a narrow band
//! above the setpoint to brake the approach. Dropping back below the setpoint
//! after having been above clears the error history once, so the integral
//! restarts from the new regime.

use serde::Deserialize;

use crate::actuator::controller::{PidController, Term};

pub const DEFAULT_DERIVATIVE_BAND: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegimeConfig {
    pub enabled: bool,
    pub derivative_band: f64,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            derivative_band: DEFAULT_DERIVATIVE_BAND,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regime {
    /// Below setpoint; `history_cleared` is set on the tick that crossed down.
    Below { history_cleared: bool },
    /// At or above setpoint; `derivative` tells whether D is active.
    Above { derivative: bool },
}

#[derive(Debug, Clone)]
pub struct RegimeSwitch {
    derivative_band: f64,
    was_above: bool,
}

impl Default for RegimeSwitch {
    fn default() -> Self {
        Self::new(DEFAULT_DERIVATIVE_BAND)
    }
}

impl RegimeSwitch {
    pub fn new(derivative_band: f64) -> Self {
        Self {
            derivative_band,
            was_above: false,
        }
    }

    pub fn from_config(config: &RegimeConfig) -> Option<Self> {
        config.enabled.then(|| Self::new(config.derivative_band))
    }

    pub fn derivative_band(&self) -> f64 {
        self.derivative_band
    }

    pub fn was_above(&self) -> bool {
        self.was_above
    }

    /// Adjust the term enables of `pid` for the latest `measurement`.
    pub fn apply(&mut self, pid: &mut PidController, measurement: f64) -> Regime {
        let setpoint = pid.setpoint();

        if measurement < setpoint {
            pid.set_enabled(Term::I, true);
            pid.set_enabled(Term::D, false);
            let history_cleared = self.was_above;
            if history_cleared {
                self.was_above = false;
                pid.clear_history();
            }
            Regime::Below { history_cleared }
        } else {
            self.was_above = true;
            pid.set_enabled(Term::I, false);
            let derivative = measurement - setpoint < self.derivative_band;
            pid.set_enabled(Term::D, derivative);
            Regime::Above { derivative }
        }
    }
}
