//! Concrete parameter values and combinations

use std::fmt;

use serde::{Deserialize, Serialize};

/// One concrete value produced for a parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Flag(bool),
    Choice(String),
    /// "HHMM-HHMM" window
    Time(String),
}

impl ParamValue {
    /// Numeric view used for sorting and exclusion checks
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Flag(v) => write!(f, "{}", v),
            Self::Choice(v) | Self::Time(v) => write!(f, "{}", v),
        }
    }
}

/// A single name/value pair within a combination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub name: String,
    pub value: ParamValue,
}

impl Assignment {
    pub fn new(name: impl Into<String>, value: ParamValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// One fully-assigned set of parameter values for a single trial
///
/// Assignments are kept in parameter declaration order. Parameters that
/// generate no values never appear.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Combination(Vec<Assignment>);

impl Combination {
    pub fn new(assignments: Vec<Assignment>) -> Self {
        Self(assignments)
    }

    /// Look up a value by parameter name
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.iter().find(|a| a.name == name).map(|a| &a.value)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Assignment> {
        self.0.iter()
    }
}

impl fmt::Display for Combination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|a| format!("{}={}", a.name, a.value)).collect();
        write!(f, "{}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn combo() -> Combination {
        Combination::new(vec![
            Assignment {
                name: "length".to_string(),
                value: ParamValue::Int(14),
            },
            Assignment {
                name: "session".to_string(),
                value: ParamValue::Time("0930-1600".to_string()),
            },
        ])
    }

    #[test]
    fn test_get_by_name() {
        let c = combo();
        assert_eq!(c.get("length"), Some(&ParamValue::Int(14)));
        assert_eq!(c.get("missing"), None);
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn test_display_keeps_declaration_order() {
        assert_eq!(combo().to_string(), "length=14, session=0930-1600");
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(combo()).unwrap();
        assert_eq!(json[0]["name"], "length");
        assert_eq!(json[0]["value"]["type"], "int");
        assert_eq!(json[1]["value"]["value"], "0930-1600");

        let back: Combination = serde_json::from_value(json).unwrap();
        assert_eq!(back, combo());
    }
}
