//! Stored values and their declared types.

use crate::types::Uid;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// One value of a predicate on a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// UTF-8 string.
    Str(String),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// Boolean.
    Bool(bool),
    /// Edge to another node.
    Uid(Uid),
}

impl Value {
    /// Returns the target when this value is an edge.
    #[must_use]
    pub fn as_uid(&self) -> Option<Uid> {
        match self {
            Value::Uid(uid) => Some(*uid),
            _ => None,
        }
    }

    /// Renders the value as text, the form used by term matching and `eq`.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Uid(uid) => uid.to_string(),
        }
    }

    /// Renders the value for a JSON response.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Uid(uid) => serde_json::Value::String(uid.to_string()),
        }
    }

    /// Total order used for sorting results.
    ///
    /// Numbers compare numerically across `Int`/`Float`; otherwise values
    /// of different types order by type rank.
    #[must_use]
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).total_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.total_cmp(&(*b as f64)),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Uid(a), Value::Uid(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Int(_) | Value::Float(_) => 0,
            Value::Str(_) => 1,
            Value::Bool(_) => 2,
            Value::Uid(_) => 3,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

/// Declared type of a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    /// No declared type; scalars are stored as given.
    Default,
    /// `string`
    String,
    /// `int`
    Int,
    /// `float`
    Float,
    /// `bool`
    Bool,
    /// `uid`, an edge to another node.
    Uid,
}

impl ValueType {
    /// Parses a schema type name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "default" => Some(Self::Default),
            "string" => Some(Self::String),
            "int" => Some(Self::Int),
            "float" => Some(Self::Float),
            "bool" => Some(Self::Bool),
            "uid" => Some(Self::Uid),
            _ => None,
        }
    }

    /// Parses an RDF `^^<xs:...>` type hint.
    #[must_use]
    pub fn from_xsd(hint: &str) -> Option<Self> {
        match hint {
            "xs:string" => Some(Self::String),
            "xs:int" | "xs:integer" => Some(Self::Int),
            "xs:float" | "xs:double" => Some(Self::Float),
            "xs:boolean" => Some(Self::Bool),
            _ => None,
        }
    }

    /// The schema name of the type.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::String => "string",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Uid => "uid",
        }
    }

    /// Converts literal text into a value of this type.
    pub fn parse_text(self, text: &str) -> Result<Value, String> {
        match self {
            Self::Default | Self::String => Ok(Value::Str(text.to_string())),
            Self::Int => text
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| format!("{text:?} is not an int")),
            Self::Float => text
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| format!("{text:?} is not a float")),
            Self::Bool => match text.trim() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(format!("{text:?} is not a bool")),
            },
            Self::Uid => Err("literal given for a uid predicate".to_string()),
        }
    }

    /// Converts an already typed scalar into this type.
    pub fn convert(self, value: Value) -> Result<Value, String> {
        match (self, value) {
            (Self::Uid, Value::Uid(uid)) => Ok(Value::Uid(uid)),
            (_, Value::Uid(_)) => Err(format!("edge given for a {} predicate", self.name())),
            (Self::Uid, _) => Err("literal given for a uid predicate".to_string()),
            (Self::Default, value) => Ok(value),
            (Self::String, value) => Ok(Value::Str(value.to_text())),
            (Self::Int, Value::Int(i)) => Ok(Value::Int(i)),
            (Self::Int, Value::Float(f)) if f.fract() == 0.0 && f.is_finite() => {
                Ok(Value::Int(f as i64))
            }
            (Self::Float, Value::Float(f)) => Ok(Value::Float(f)),
            (Self::Float, Value::Int(i)) => Ok(Value::Float(i as f64)),
            (Self::Bool, Value::Bool(b)) => Ok(Value::Bool(b)),
            (ty, Value::Str(s)) => ty.parse_text(&s),
            (ty, other) => Err(format!("{other} is not a {}", ty.name())),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
