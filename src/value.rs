//! Values an environment can hold and the changes applied to it.
//!
//! An environment's state is a `Value`, and so is every delta handed to
//! `Environment::add_change`. Deltas are folded into the current state with
//! [`Value::combine`].

use serde::{Deserialize, Serialize};

/// State or delta value.
///
/// # Examples
///
/// ```
/// use vermon::Value;
///
/// let state = Value::from(10);
/// let next = state.combine(&Value::from(5)).unwrap();
/// assert_eq!(next, Value::Number(15.0));
///
/// let text = Value::from("").combine(&Value::from("motion")).unwrap();
/// assert_eq!(text.as_text(), Some("motion"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// No state.
    Null,
    /// A number. Integers are widened to `f64`.
    Number(f64),
    /// A string.
    Text(String),
    /// An ordered list.
    List(Vec<Value>),
    /// Any other JSON object, adopted as-is.
    Structured(serde_json::Map<String, serde_json::Value>),
}

impl Value {
    /// True for [`Value::Null`].
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// True for [`Value::Number`].
    pub const fn is_number(&self) -> bool {
        matches!(self, Self::Number(_))
    }

    /// True for [`Value::Text`].
    pub const fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }

    /// The number, if this is one.
    pub const fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// The string, if this is one.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    /// The items, if this is a list.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(v) => Some(v),
            _ => None,
        }
    }

    /// Returns a human-readable type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "Null",
            Self::Number(_) => "Number",
            Self::Text(_) => "String",
            Self::List(_) => "Array",
            Self::Structured(_) => "Object",
        }
    }

    /// Folds `delta` into `self`, producing the proposed next state.
    ///
    /// Numbers add, text concatenates with numbers or text, lists append,
    /// and an unset (`Null`) state adopts the delta. Any other pairing is
    /// not a valid change and yields `None`.
    #[must_use]
    pub fn combine(&self, delta: &Value) -> Option<Value> {
        match (self, delta) {
            (Self::Number(a), Self::Number(b)) => Some(Self::Number(a + b)),
            (Self::Text(a), Self::Text(b)) => Some(Self::Text(format!("{a}{b}"))),
            (Self::Text(_), Self::Number(_)) | (Self::Number(_), Self::Text(_)) => {
                Some(Self::Text(format!("{}{}", self.display_plain(), delta.display_plain())))
            }
            (Self::List(a), Self::List(b)) => {
                let mut out = a.clone();
                out.extend(b.iter().cloned());
                Some(Self::List(out))
            }
            (Self::Null, d) if !d.is_null() => Some(d.clone()),
            _ => None,
        }
    }

    /// Display form without quoting text, used for concatenation.
    fn display_plain(&self) -> String {
        match self {
            Self::Text(v) => v.clone(),
            other => other.to_string(),
        }
    }

    /// Converts into the JSON representation.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::Number(0.0)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Number(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v:?}"),
            Self::List(v) => {
                write!(f, "[")?;
                for (i, item) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Structured(v) => write!(f, "{}", serde_json::Value::Object(v.clone())),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Number(f64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Number(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Number(if b { 1.0 } else { 0.0 }),
            serde_json::Value::Number(n) => Self::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => Self::Text(s),
            serde_json::Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            serde_json::Value::Object(map) => Self::Structured(map),
        }
    }
}
