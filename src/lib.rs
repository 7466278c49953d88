//! PID temperature / laser-lock stabilization for lab data acquisition.
//!
//! A rolling-history PID controller fed by a single-threaded polling loop:
//! read a sensor, update the controller, clamp, switch term enables by
//! regime, drive the actuator and append a tab-separated run log line.

pub mod actuator;
pub mod config;
pub mod driver;
pub mod error;
pub mod metrics;
pub mod record;
pub mod sensor;
pub mod signal;
pub mod simulation;

pub use actuator::controller::{OutputMode, PidConfig, PidController, PidSnapshot, Term};
pub use actuator::history::RollingErrorBuffer;
pub use actuator::Actuator;
pub use config::RunConfig;
pub use driver::regime::{Regime, RegimeSwitch};
pub use driver::{ControlLoop, LoopConfig, LoopStats, LoopSummary, TickOutcome};
pub use error::{ControlError, ControlResult};
pub use record::{read_records, RunLogWriter, TickRecord};
pub use sensor::Sensor;
pub use signal::StopSignal;
