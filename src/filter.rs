//! Filters gating state commits and detections.
//!
//! A filter is a pure predicate over a proposed state (and, at detector
//! level, the detector's name). Chains are evaluated fresh for every change
//! and pass only when every filter passes.

use serde::{Deserialize, Serialize};

use crate::error::{BindingError, ValidationError, VermonError};
use crate::value::Value;

/// What a filter gets to look at.
#[derive(Debug, Clone, Copy)]
pub struct FilterContext<'a> {
    /// The state that would result from the change.
    pub proposed: &'a Value,
    /// Name of the detector evaluating the chain, if any.
    pub detector: Option<&'a str>,
}

impl<'a> FilterContext<'a> {
    /// Context for an environment-level chain.
    #[must_use]
    pub const fn environment(proposed: &'a Value) -> Self {
        Self {
            proposed,
            detector: None,
        }
    }

    /// Context for a detector-level chain.
    #[must_use]
    pub const fn detector(proposed: &'a Value, detector: &'a str) -> Self {
        Self {
            proposed,
            detector: Some(detector),
        }
    }
}

/// Filter kinds.
///
/// # Examples
///
/// ```
/// use vermon::{Filter, FilterContext, Value};
///
/// let high = Filter::high_pass(10.0);
/// assert!(!high.passes(&FilterContext::environment(&Value::from(5))));
/// assert!(high.passes(&FilterContext::environment(&Value::from(15))));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "PascalCase")]
pub enum Filter {
    /// Lets everything through.
    #[serde(rename = "BaseFilter")]
    Base,

    /// Blocks everything.
    #[serde(rename = "BlockAllFilter")]
    BlockAll,

    /// Blocks a proposed state equal to `value`.
    #[serde(rename = "ValueFilter")]
    Value {
        /// Blocked value.
        value: Value,
    },

    /// Blocks detections coming from the detector called `name`.
    #[serde(rename = "NameFilter")]
    Name {
        /// Blocked detector name.
        name: String,
    },

    /// Passes only proposed states strictly above `threshold`.
    #[serde(rename = "HighPassFilter")]
    HighPass {
        /// Exclusive lower bound.
        threshold: f64,
    },

    /// Passes only proposed states at or below `threshold`.
    #[serde(rename = "LowPassFilter")]
    LowPass {
        /// Inclusive upper bound.
        threshold: f64,
    },
}

impl Filter {
    /// Creates a value filter.
    #[must_use]
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value {
            value: value.into(),
        }
    }

    /// Creates a name filter.
    #[must_use]
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name { name: name.into() }
    }

    /// Creates a high-pass filter.
    #[must_use]
    pub const fn high_pass(threshold: f64) -> Self {
        Self::HighPass { threshold }
    }

    /// Creates a low-pass filter.
    #[must_use]
    pub const fn low_pass(threshold: f64) -> Self {
        Self::LowPass { threshold }
    }

    /// Class name as used in configuration files.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Base => "BaseFilter",
            Self::BlockAll => "BlockAllFilter",
            Self::Value { .. } => "ValueFilter",
            Self::Name { .. } => "NameFilter",
            Self::HighPass { .. } => "HighPassFilter",
            Self::LowPass { .. } => "LowPassFilter",
        }
    }

    /// Returns true if the filter lets the change through.
    ///
    /// Numeric comparisons never hold for non-numeric states.
    #[must_use]
    pub fn passes(&self, ctx: &FilterContext<'_>) -> bool {
        match self {
            Self::Base => true,
            Self::BlockAll => false,
            Self::Value { value } => ctx.proposed != value,
            Self::Name { name } => ctx.detector != Some(name.as_str()),
            Self::HighPass { threshold } => ctx.proposed.as_number().is_some_and(|v| v > *threshold),
            Self::LowPass { threshold } => ctx.proposed.as_number().is_some_and(|v| v <= *threshold),
        }
    }

    /// Builds a filter from its class name and a single argument, the way
    /// configuration files declare them (`{"HighPassFilter": 10}`).
    pub fn from_class(class: &str, arg: Option<&serde_json::Value>) -> Result<Self, ValidationError> {
        let number = |field: &str| -> Result<f64, ValidationError> {
            arg.and_then(serde_json::Value::as_f64).ok_or_else(|| ValidationError::InvalidField {
                field: field.to_string(),
                reason: format!("{class} expects a numeric threshold"),
            })
        };

        match class {
            "BaseFilter" => Ok(Self::Base),
            "BlockAllFilter" => Ok(Self::BlockAll),
            "ValueFilter" => Ok(Self::value(Value::from(
                arg.cloned().unwrap_or(serde_json::Value::Null),
            ))),
            "NameFilter" => match arg.and_then(serde_json::Value::as_str) {
                Some(name) => Ok(Self::name(name)),
                None => Err(ValidationError::InvalidField {
                    field: "name".to_string(),
                    reason: "NameFilter expects a string".to_string(),
                }),
            },
            "HighPassFilter" => Ok(Self::high_pass(number("threshold")?)),
            "LowPassFilter" => Ok(Self::low_pass(number("threshold")?)),
            other => Err(ValidationError::UnknownFilter {
                name: other.to_string(),
            }),
        }
    }
}

impl Default for Filter {
    fn default() -> Self {
        Self::Base
    }
}

impl TryFrom<&serde_json::Value> for Filter {
    type Error = VermonError;

    /// Accepts either the tagged form (`{"type": "HighPassFilter", "threshold": 10}`)
    /// or the class form (`{"HighPassFilter": 10}`). Anything else is not a filter.
    fn try_from(value: &serde_json::Value) -> Result<Self, Self::Error> {
        let Some(obj) = value.as_object() else {
            return Err(BindingError::NotAFilter.into());
        };

        if obj.contains_key("type") {
            return serde_json::from_value(value.clone()).map_err(|_| BindingError::NotAFilter.into());
        }

        match obj.iter().next() {
            Some((class, arg)) if obj.len() == 1 && class.ends_with("Filter") => {
                let arg = if arg.is_null() { None } else { Some(arg) };
                Ok(Self::from_class(class, arg)?)
            }
            _ => Err(BindingError::NotAFilter.into()),
        }
    }
}

/// Evaluates a chain: passes only if every filter passes.
#[must_use]
pub fn evaluate(chain: &[Filter], ctx: &FilterContext<'_>) -> bool {
    chain.iter().all(|f| f.passes(ctx))
}
