//! Typed scalar values for dataset fields.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// A typed scalar held by one field of a record.
///
/// Parsing tries integers first, then reals; anything else stays a string.
/// This matches how the dataset loader types each column from its raw text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Integer field.
    Int(i64),
    /// Real-valued field (modeled scaled ×10 inside the solver).
    Real(f64),
    /// String field (encoded as an index into the attribute's value domain).
    Str(String),
}

impl Value {
    /// Parse a raw cell into its typed value.
    pub fn parse(raw: &str) -> Self {
        if let Ok(n) = raw.parse::<i64>() {
            return Self::Int(n);
        }
        if let Ok(r) = raw.parse::<f64>() {
            return Self::Real(r);
        }
        Self::Str(raw.to_string())
    }

    /// Returns true for string values.
    pub fn is_str(&self) -> bool {
        matches!(self, Self::Str(_))
    }

    /// The string content, if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// The integer content, if this is an integer value.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric view of the value: integers widen to `f64`, strings yield `None`.
    pub fn as_num(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(*n as f64),
            Self::Real(r) => Some(*r),
            Self::Str(_) => None,
        }
    }
}

// Values are used as grouping keys (QI tuples, path conditions), so reals
// compare and hash by bit pattern rather than by IEEE equality.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Real(a), Self::Real(b)) => a.to_bits() == b.to_bits(),
            (Self::Str(a), Self::Str(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Int(n) => {
                0u8.hash(state);
                n.hash(state);
            }
            Self::Real(r) => {
                1u8.hash(state);
                r.to_bits().hash(state);
            }
            Self::Str(s) => {
                2u8.hash(state);
                s.hash(state);
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{}", n),
            Self::Real(r) => write!(f, "{}", r),
            Self::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<f64> for Value {
    fn from(r: f64) -> Self {
        Self::Real(r)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn parse_prefers_int_then_real_then_string() {
        assert_eq!(Value::parse("42"), Value::Int(42));
        assert_eq!(Value::parse("-7"), Value::Int(-7));
        assert_eq!(Value::parse("4.5"), Value::Real(4.5));
        assert_eq!(Value::parse("Cancer"), Value::Str("Cancer".to_string()));
        assert_eq!(Value::parse("40000-49999"), Value::from("40000-49999"));
    }

    #[test]
    fn display_roundtrips_through_parse() {
        for raw in ["42", "-7", "4.5", "Cancer", "Heart disease"] {
            let v = Value::parse(raw);
            assert_eq!(Value::parse(&v.to_string()), v);
        }
    }

    #[test]
    fn cross_type_values_are_distinct_keys() {
        let mut set = HashSet::new();
        set.insert(Value::Int(5));
        set.insert(Value::Real(5.0));
        set.insert(Value::from("5"));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn numeric_view() {
        assert_eq!(Value::Int(30).as_num(), Some(30.0));
        assert_eq!(Value::Real(1.5).as_num(), Some(1.5));
        assert_eq!(Value::from("x").as_num(), None);
    }
}
