//! Error taxonomy shared by the controller, the control loop and its collaborators

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("sensor {sensor} unavailable: {reason}")]
    SensorUnavailable { sensor: String, reason: String },

    #[error("actuator {actuator} rejected write: {reason}")]
    ActuatorRejected { actuator: String, reason: String },

    #[error("transport failure on {collaborator}: {source}")]
    Transport {
        collaborator: String,
        #[source]
        source: io::Error,
    },

    #[error("malformed run log record on line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    #[error("I/O: {0}")]
    Io(#[from] io::Error),
}

impl ControlError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        ControlError::InvalidConfiguration(reason.into())
    }

    /// Sensor dropouts and busy actuators are recovered inside the loop;
    /// everything else ends the run.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ControlError::SensorUnavailable { .. } | ControlError::ActuatorRejected { .. }
        )
    }
}

pub type ControlResult<T> = Result<T, ControlError>;
