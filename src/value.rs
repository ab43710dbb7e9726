//! Typed values for algorithm parameters and model changes.
//!
//! Algorithm parameters arrive as strings and are validated against the
//! semantic type declared in the algorithm catalog. Model change values may
//! be numbers or string-encoded numbers and are coerced per run.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Semantic type of an algorithm parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Float,
    Integer,
    Boolean,
}

impl ValueType {
    /// Returns true if `value` can be parsed as this type.
    #[must_use]
    pub fn validate_str(self, value: &str) -> bool {
        self.parse(value).is_some()
    }

    /// Parses `value` as this type.
    ///
    /// - Floats accept anything `f64` parses, including `inf` and `nan`.
    /// - Integers accept integer literals and floats with no fractional part.
    /// - Booleans accept `true`/`false`/`1`/`0`, case-insensitively.
    #[must_use]
    pub fn parse(self, value: &str) -> Option<ParameterValue> {
        let v = value.trim();
        match self {
            Self::Float => v.parse::<f64>().ok().map(ParameterValue::Float),
            Self::Integer => {
                if let Ok(i) = v.parse::<i64>() {
                    return Some(ParameterValue::Integer(i));
                }
                let f = v.parse::<f64>().ok()?;
                #[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
                if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15 {
                    Some(ParameterValue::Integer(f as i64))
                } else {
                    None
                }
            }
            Self::Boolean => match v.to_ascii_lowercase().as_str() {
                "true" | "1" => Some(ParameterValue::Boolean(true)),
                "false" | "0" => Some(ParameterValue::Boolean(false)),
                _ => None,
            },
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float => write!(f, "float"),
            Self::Integer => write!(f, "integer"),
            Self::Boolean => write!(f, "boolean"),
        }
    }
}

/// A typed solver parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
}

impl ParameterValue {
    /// Returns the semantic type of this value.
    #[must_use]
    pub const fn value_type(&self) -> ValueType {
        match self {
            Self::Float(_) => ValueType::Float,
            Self::Integer(_) => ValueType::Integer,
            Self::Boolean(_) => ValueType::Boolean,
        }
    }

    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            #[allow(clippy::cast_precision_loss)]
            Self::Integer(v) => Some(*v as f64),
            Self::Boolean(_) => None,
        }
    }

    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Boolean(v) => write!(f, "{v}"),
        }
    }
}

impl From<f64> for ParameterValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for ParameterValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<bool> for ParameterValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

/// New value of a model change.
///
/// Serialized untagged so task descriptions may carry either `0.011` or
/// `"0.011"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChangeValue {
    Number(f64),
    Text(String),
}

impl ChangeValue {
    /// Coerces the value to a number.
    ///
    /// Returns `None` for text that does not parse as `f64`.
    #[must_use]
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            Self::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }
}

impl fmt::Display for ChangeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(v) => write!(f, "{v}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<f64> for ChangeValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<&str> for ChangeValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for ChangeValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_parsing() {
        assert_eq!(ValueType::Float.parse("1e-8"), Some(ParameterValue::Float(1e-8)));
        assert!(ValueType::Float.validate_str(" 2.5 "));
        assert!(!ValueType::Float.validate_str("abc"));
    }

    #[test]
    fn integer_parsing_accepts_integral_floats() {
        assert_eq!(ValueType::Integer.parse("5"), Some(ParameterValue::Integer(5)));
        assert_eq!(ValueType::Integer.parse("5.0"), Some(ParameterValue::Integer(5)));
        assert_eq!(ValueType::Integer.parse("5.5"), None);
        assert_eq!(ValueType::Integer.parse("nan"), None);
    }

    #[test]
    fn boolean_parsing() {
        assert_eq!(ValueType::Boolean.parse("TRUE"), Some(ParameterValue::Boolean(true)));
        assert_eq!(ValueType::Boolean.parse("0"), Some(ParameterValue::Boolean(false)));
        assert_eq!(ValueType::Boolean.parse("yes"), None);
    }

    #[test]
    fn change_value_coercion() {
        assert_eq!(ChangeValue::Number(0.011).to_f64(), Some(0.011));
        assert_eq!(ChangeValue::from("0.011").to_f64(), Some(0.011));
        assert_eq!(ChangeValue::from("abc").to_f64(), None);
    }

    #[test]
    fn change_value_deserializes_numbers_and_strings() {
        let v: ChangeValue = serde_json::from_str("3.01").unwrap();
        assert_eq!(v, ChangeValue::Number(3.01));
        let v: ChangeValue = serde_json::from_str("\"3.01\"").unwrap();
        assert_eq!(v, ChangeValue::Text("3.01".to_string()));
    }

    #[test]
    fn parameter_value_display() {
        assert_eq!(ParameterValue::Float(1e-8).to_string(), "0.00000001");
        assert_eq!(ParameterValue::Integer(12).to_string(), "12");
        assert_eq!(ParameterValue::Boolean(true).to_string(), "true");
    }
}
