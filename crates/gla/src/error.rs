//! Errors surfaced by operators and by the worker runtime.
//!
//! Only configuration errors, capacity violations, malformed items and
//! worker failures are reported through [`Error`].  Numeric degeneracies
//! (empty clusters, zero denominators) and round-cap exhaustion are absorbed
//! by the operators and the round controller and never show up here.

use serde::Serialize;
use std::{borrow::Cow, error::Error as StdError};
use thiserror::Error;

use crate::runtime::WorkerPanicInfo;

/// An error with a stable identifying name, suitable for matching on in
/// logs and tests without parsing the message.
pub trait DetailedError: StdError + Serialize {
    fn error_code(&self) -> Cow<'static, str>;
}

#[derive(Clone, Debug, Error, PartialEq, Serialize)]
pub enum Error {
    /// Invalid operator or runtime parameters, detected before any data flows.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// A request for a sample slot beyond the configured sample size.
    #[error("sample slot {index} is beyond the configured sample size {size}")]
    Capacity { index: usize, size: usize },

    /// A vertex id too large to index the vertex arrays of a graph
    /// operator.
    #[error("vertex id {vertex} is too large to index the vertex arrays")]
    VertexRange { vertex: u64 },

    /// An item whose number of coordinates differs from the configured
    /// dimension.  Such items are left out of the aggregate.
    #[error("expected items of dimension {expected}, got an item of dimension {actual}")]
    Dimension { expected: usize, actual: usize },

    /// The runtime failed to start a worker thread.
    #[error("failed to spawn worker thread {worker}: {message}")]
    WorkerSpawn { worker: usize, message: String },

    /// One or more worker threads terminated unexpectedly.
    #[error("{}", WorkerPanicInfo::summarize(.panic_info))]
    WorkerPanic {
        // Panic information from every worker that reported one.
        panic_info: Vec<(usize, WorkerPanicInfo)>,
    },
}

impl DetailedError for Error {
    fn error_code(&self) -> Cow<'static, str> {
        match self {
            Self::Config(error) => error.error_code(),
            Self::Capacity { .. } => Cow::from("CapacityExceeded"),
            Self::VertexRange { .. } => Cow::from("VertexRange"),
            Self::Dimension { .. } => Cow::from("DimensionMismatch"),
            Self::WorkerSpawn { .. } => Cow::from("WorkerSpawn"),
            Self::WorkerPanic { .. } => Cow::from("WorkerPanic"),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Serialize)]
pub enum ConfigError {
    /// A parameter is outside of its valid domain.
    #[error("parameter `{name}` must be {expected}, got {value}")]
    InvalidParameter {
        name: &'static str,
        value: String,
        expected: &'static str,
    },

    /// The configuration document could not be deserialized.
    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

impl ConfigError {
    pub(crate) fn invalid(
        name: &'static str,
        value: impl ToString,
        expected: &'static str,
    ) -> Self {
        Self::InvalidParameter {
            name,
            value: value.to_string(),
            expected,
        }
    }
}

impl DetailedError for ConfigError {
    fn error_code(&self) -> Cow<'static, str> {
        match self {
            Self::InvalidParameter { .. } => Cow::from("InvalidParameter"),
            Self::Parse(_) => Cow::from("ConfigParse"),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(error: serde_json::Error) -> Self {
        Self::Parse(error.to_string())
    }
}

#[cfg(test)]
mod test {
    use super::{ConfigError, DetailedError, Error};

    #[test]
    fn error_codes() {
        let error = Error::from(ConfigError::invalid("size", 0, "at least 1"));
        assert_eq!(error.error_code(), "InvalidParameter");
        assert_eq!(
            error.to_string(),
            "invalid configuration: parameter `size` must be at least 1, got 0"
        );

        let error = Error::Capacity { index: 5, size: 3 };
        assert_eq!(error.error_code(), "CapacityExceeded");
    }

    #[test]
    fn serializes_to_json() {
        let error = Error::Capacity { index: 5, size: 3 };
        let json = serde_json::to_value(&error).unwrap();
        assert_eq!(json["Capacity"]["index"], 5);
    }
}
