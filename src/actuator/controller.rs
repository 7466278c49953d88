use serde::Deserialize;

use super::history::RollingErrorBuffer;
use crate::error::{ControlError, ControlResult};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Integral estimates whose proportional-scaled magnitude reaches this value
/// are discarded and the previous estimate is kept.
pub const INTEGRAL_GUARD: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PidConfig {
    pub p: f64,
    pub i: f64,
    pub d: f64,
    /// Stored and reported, but the update path only applies the fixed
    /// `INTEGRAL_GUARD` gate.
    pub integral_min: f64,
    pub integral_max: f64,
    pub history_size: usize,
}

impl Default for PidConfig {
    fn default() -> Self {
        Self {
            p: 0.0,
            i: 0.0,
            d: 0.0,
            integral_min: -500.0,
            integral_max: 500.0,
            history_size: 100,
        }
    }
}

impl PidConfig {
    pub fn validate(&self) -> ControlResult<()> {
        for (name, gain) in [("P", self.p), ("I", self.i), ("D", self.d)] {
            if !gain.is_finite() {
                return Err(ControlError::invalid(format!("gain {name} must be finite, got {gain}")));
            }
        }
        if !self.integral_min.is_finite() || !self.integral_max.is_finite() {
            return Err(ControlError::invalid("integral bounds must be finite"));
        }
        if self.history_size < 1 {
            return Err(ControlError::invalid("history size must be at least 1"));
        }
        Ok(())
    }
}

// ============================================================================
// TERMS AND MODES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Term {
    P,
    I,
    D,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputMode {
    Auto,
    /// Output forced to the operator value, bypassing the control law.
    Manual(f64),
}

/// Everything a log line or a status report needs from one update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidSnapshot {
    pub measurement: f64,
    pub setpoint: f64,
    pub error: f64,
    pub term_p: f64,
    pub term_i: f64,
    pub term_d: f64,
    pub output: f64,
}

// ============================================================================
// PID CONTROLLER
// ============================================================================

#[derive(Debug, Clone)]
pub struct PidController {
    config: PidConfig,
    use_p: bool,
    use_i: bool,
    use_d: bool,
    mode: OutputMode,

    setpoint: f64,
    measure: f64,
    error: f64,

    history: RollingErrorBuffer,
    integral: f64,
    derivative: f64,

    term_p: f64,
    term_i: f64,
    term_d: f64,
    output: f64,
}

impl PidController {
    /// Proportional term enabled, integral and derivative disabled, automatic mode.
    pub fn new(config: PidConfig) -> ControlResult<Self> {
        config.validate()?;
        Ok(Self {
            history: RollingErrorBuffer::new(config.history_size)?,
            config,
            use_p: true,
            use_i: false,
            use_d: false,
            mode: OutputMode::Auto,
            setpoint: 0.0,
            measure: 0.0,
            error: 0.0,
            integral: 0.0,
            derivative: 0.0,
            term_p: 0.0,
            term_i: 0.0,
            term_d: 0.0,
            output: 0.0,
        })
    }

    /// Replace the tunables. The error history is resized, never cleared.
    pub fn configure(&mut self, config: PidConfig) -> ControlResult<()> {
        config.validate()?;
        self.history.resize(config.history_size)?;
        self.config = config;
        Ok(())
    }

    pub fn config(&self) -> &PidConfig {
        &self.config
    }

    pub fn integral_limits(&self) -> (f64, f64) {
        (self.config.integral_min, self.config.integral_max)
    }

    pub fn set_enabled(&mut self, term: Term, enabled: bool) {
        match term {
            Term::P => self.use_p = enabled,
            Term::I => self.use_i = enabled,
            Term::D => self.use_d = enabled,
        }
    }

    pub fn is_enabled(&self, term: Term) -> bool {
        match term {
            Term::P => self.use_p,
            Term::I => self.use_i,
            Term::D => self.use_d,
        }
    }

    pub fn set_setpoint(&mut self, setpoint: f64) {
        self.setpoint = setpoint;
    }

    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    /// Enabling without a value forces the output to `0.0`.
    pub fn set_manual(&mut self, enabled: bool, value: Option<f64>) {
        self.mode = if enabled {
            OutputMode::Manual(value.unwrap_or(0.0))
        } else {
            OutputMode::Auto
        };
    }

    pub fn set_mode(&mut self, mode: OutputMode) {
        self.mode = mode;
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn history(&self) -> &RollingErrorBuffer {
        &self.history
    }

    /// Take one measurement and return the new output.
    ///
    /// The history, integral and derivative are updated whether or not the
    /// I and D terms are enabled; the flags only gate their contribution.
    pub fn feed(&mut self, measurement: f64) -> f64 {
        self.measure = measurement;
        self.error = self.setpoint - measurement;
        self.history.push(self.error);

        let raw_integral = self.history.trapezoid();
        if (self.config.p * raw_integral).abs() < INTEGRAL_GUARD {
            self.integral = raw_integral;
        }
        self.derivative = self.history.derivative();

        self.update()
    }

    /// Recompute the terms and the output from the current state.
    pub fn update(&mut self) -> f64 {
        let p = self.config.p;
        self.term_p = p * self.error;
        self.term_i = if self.use_i { p * self.config.i * self.integral } else { 0.0 };
        self.term_d = if self.use_d { -(p * self.config.d * self.derivative) } else { 0.0 };

        self.output = if !self.use_p {
            0.0
        } else {
            match self.mode {
                OutputMode::Manual(value) => value,
                OutputMode::Auto => self.term_p + self.term_i + self.term_d,
            }
        };
        self.output
    }

    pub fn output(&self) -> f64 {
        self.output
    }

    pub fn error(&self) -> f64 {
        self.error
    }

    pub fn measurement(&self) -> f64 {
        self.measure
    }

    pub fn integral(&self) -> f64 {
        self.integral
    }

    pub fn derivative(&self) -> f64 {
        self.derivative
    }

    pub fn terms(&self) -> (f64, f64, f64) {
        (self.term_p, self.term_i, self.term_d)
    }

    pub fn snapshot(&self) -> PidSnapshot {
        PidSnapshot {
            measurement: self.measure,
            setpoint: self.setpoint,
            error: self.error,
            term_p: self.term_p,
            term_i: self.term_i,
            term_d: self.term_d,
            output: self.output,
        }
    }
}
