//! Property value type.
//!
//! Trimmed to exactly what the synthesis schema stores: scalars for names
//! and counts, id arrays for descendant sets, string arrays for
//! supporting-source lists.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A property value on a node or relationship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// Array of node/taxon ids, e.g. the `mrca` / `outmrca` properties.
    IdList(Vec<u64>),
    /// Array of strings, e.g. the `supporting_sources` property.
    StringList(Vec<String>),
}

// ============================================================================
// Type checking / extraction
// ============================================================================

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "BOOLEAN",
            Value::Int(_) => "INTEGER",
            Value::Float(_) => "FLOAT",
            Value::String(_) => "STRING",
            Value::IdList(_) => "ID_LIST",
            Value::StringList(_) => "STRING_LIST",
        }
    }

    pub fn is_null(&self) -> bool { matches!(self, Value::Null) }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_ids(&self) -> Option<&[u64]> {
        match self {
            Value::IdList(ids) => Some(ids),
            _ => None,
        }
    }

    pub fn as_strings(&self) -> Option<&[String]> {
        match self {
            Value::StringList(s) => Some(s),
            _ => None,
        }
    }
}

// ============================================================================
// Conversions (From impls)
// ============================================================================

impl From<bool> for Value { fn from(v: bool) -> Self { Value::Bool(v) } }
impl From<i32> for Value { fn from(v: i32) -> Self { Value::Int(v as i64) } }
impl From<i64> for Value { fn from(v: i64) -> Self { Value::Int(v) } }
impl From<f64> for Value { fn from(v: f64) -> Self { Value::Float(v) } }
impl From<String> for Value { fn from(v: String) -> Self { Value::String(v) } }
impl From<&str> for Value { fn from(v: &str) -> Self { Value::String(v.to_owned()) } }
impl From<Vec<u64>> for Value { fn from(v: Vec<u64>) -> Self { Value::IdList(v) } }
impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self { Value::StringList(v) }
}
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self { v.map(Into::into).unwrap_or(Value::Null) }
}

// ============================================================================
// Display
// ============================================================================

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(s) => write!(f, "\"{}\"", s.replace('"', "\\\"")),
            Value::IdList(ids) => {
                write!(f, "[")?;
                for (i, id) in ids.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{id}")?;
                }
                write!(f, "]")
            }
            Value::StringList(strs) => {
                write!(f, "[")?;
                for (i, s) in strs.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "\"{s}\"")?;
                }
                write!(f, "]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_from() {
        assert_eq!(Value::from("hello"), Value::String("hello".into()));
        assert_eq!(Value::from(42), Value::Int(42));
        assert_eq!(Value::from(3.14), Value::Float(3.14));
        assert_eq!(Value::from(vec![1u64, 2, 3]), Value::IdList(vec![1, 2, 3]));
    }

    #[test]
    fn test_extraction() {
        assert_eq!(Value::Int(7).as_int(), Some(7));
        assert_eq!(Value::Int(7).as_float(), Some(7.0));
        assert_eq!(Value::String("x".into()).as_int(), None);
        assert_eq!(Value::IdList(vec![4, 5]).as_ids(), Some(&[4u64, 5][..]));
    }

    #[test]
    fn test_display_id_list() {
        assert_eq!(Value::IdList(vec![1, 2, 3]).to_string(), "[1, 2, 3]");
    }
}
