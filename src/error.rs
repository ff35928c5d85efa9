//! Error types for vermon.
//!
//! All errors in vermon are strongly typed using thiserror.
//! Propagation itself never fails: construction, binding and
//! configuration problems are reported here, while unrecognized
//! changes travel through the `ignoredChange` event instead.

use thiserror::Error;

use crate::detector::DetectorId;
use crate::environment::EnvironmentId;

/// Validation errors raised while constructing entities.
#[allow(missing_docs)]
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Motion detector first argument (name) is not of type string. Provided value was {provided}")]
    DetectorNameNotString {
        provided: String,
    },

    #[error("MultiEnvironment expects a state of type Array.")]
    MultiEnvironmentStateNotArray,

    #[error("MultiEnvironment expects a state of type Array of type Environment, found '{found}'")]
    MultiEnvironmentStateNotEnvironment {
        found: String,
    },

    #[error("Field '{field}' has an invalid value: {reason}")]
    InvalidField {
        field: String,
        reason: String,
    },

    #[error("Unknown filter type '{name}'")]
    UnknownFilter {
        name: String,
    },
}

/// Errors raised while wiring entities together.
#[allow(missing_docs)]
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BindingError {
    #[error("Filter object not of type BaseFilter.")]
    NotAFilter,

    #[error("Sub-environment '{name}' does not exist")]
    UnknownSubEnvironment {
        name: String,
    },

    #[error("Environment '{name}' is a MultiEnvironment; detectors must target one of its sub-environments")]
    CompositeTarget {
        name: String,
    },

    #[error("Detector '{name}' does not exist")]
    UnknownDetector {
        name: String,
    },

    #[error("Detector {detector} is not bound to environment {environment}")]
    DetectorNotBound {
        detector: DetectorId,
        environment: EnvironmentId,
    },
}

/// Errors raised while loading profiles or building entities from them.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {message}")]
    Parse {
        message: String,
    },

    #[error("Profile '{name}' does not exist")]
    ProfileNotFound {
        name: String,
    },

    #[error("Class name '{name}' is not recognized, did you forget to use the 'extend' method?")]
    UnknownClass {
        name: String,
    },

    #[error("'{keyword}' is a reserved keyword and may not be used as Configuration object")]
    ReservedKeyword {
        keyword: String,
    },

    #[error("Profile does not declare an environment")]
    MissingEnvironment,
}

/// Errors reported by notification sinks.
#[allow(missing_docs)]
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DeliveryError {
    #[error("Sink '{sink}' failed: {message}")]
    SinkFailed {
        sink: String,
        message: String,
    },

    #[error("Delivery channel disconnected: {path}")]
    Disconnected {
        path: String,
    },

    #[error("Timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("Failed to start delivery worker: {message}")]
    WorkerSpawn {
        message: String,
    },
}

/// Top-level error type for vermon.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum VermonError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Binding error: {0}")]
    Binding(#[from] BindingError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),
}

impl VermonError {
    /// Returns true if this is a construction-time validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a binding error.
    #[must_use]
    pub const fn is_binding(&self) -> bool {
        matches!(self, Self::Binding(_))
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns true if this is a delivery error.
    #[must_use]
    pub const fn is_delivery(&self) -> bool {
        matches!(self, Self::Delivery(_))
    }

    /// Returns true if retrying the same call could succeed.
    ///
    /// Validation, binding and config errors are deterministic.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Delivery(e) => matches!(e, DeliveryError::Timeout { .. }),
            _ => false,
        }
    }
}

/// Result type alias for vermon operations.
pub type VermonResult<T> = Result<T, VermonError>;
