// Error taxonomy shared by every layer
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Malformed user-supplied parameters. Raised before any state change.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field} must be {expected} (got {value})")]
    OutOfRange {
        field: &'static str,
        expected: &'static str,
        value: f64,
    },
    #[error("{field} must not be empty")]
    Empty { field: &'static str },
    #[error("{0}")]
    Inconsistent(String),
}

impl ValidationError {
    pub fn out_of_range(field: &'static str, expected: &'static str, value: f64) -> Self {
        Self::OutOfRange {
            field,
            expected,
            value,
        }
    }
}

/// Sensor read or actuator write failure. Fatal to the loop that observes it.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum HardwareFault {
    #[error("sensor read failed: {0}")]
    Sensor(String),
    #[error("actuator write failed: {0}")]
    Actuator(String),
    #[error("digital I/O failed: {0}")]
    DigitalIo(String),
    #[error("target current {target:.3}A is outside the calibrated range")]
    Uncalibrated { target: f64 },
}

/// Record or store read/write failure.
#[derive(Debug, Error)]
pub enum PersistenceFailure {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed data in {path}: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("settings file error: {0}")]
    Encode(String),
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("index {index} is out of bounds ({len} entries)")]
    IndexOutOfBounds { index: usize, len: usize },
}

impl PersistenceFailure {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn format(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Format {
            path: path.into(),
            source,
        }
    }
}
