use core::fmt::{self, Display};
use std::collections::BTreeMap;

use serde::Serialize;

/// A value exported by a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// A string.
    String(String),
    /// An integer.
    Integer(i64),
    /// A boolean.
    Bool(bool),
    /// A list of values.
    List(Vec<Value>),
    /// A value that failed to compute, with a description of why.
    Error(String),
}

impl Value {
    /// Access the value as a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(string) => Some(string),
            _ => None,
        }
    }

    /// Access the value as a list.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }

    /// Test if the value, or anything it contains, is an error.
    pub fn is_error(&self) -> bool {
        match self {
            Value::Error(..) => true,
            Value::List(values) => values.iter().any(Value::is_error),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(string) => write!(f, "{string:?}"),
            Value::Integer(n) => n.fmt(f),
            Value::Bool(b) => b.fmt(f),
            Value::List(values) => {
                f.write_str("[")?;

                for (n, value) in values.iter().enumerate() {
                    if n > 0 {
                        f.write_str(", ")?;
                    }

                    value.fmt(f)?;
                }

                f.write_str("]")
            }
            Value::Error(message) => write!(f, "error({message:?})"),
        }
    }
}

/// The names exported by a module once it reaches export readiness.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Exports {
    values: BTreeMap<String, Value>,
}

impl Exports {
    /// Construct an empty set of exports.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an exported value.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.values.insert(name.into(), value)
    }

    /// Look up an exported value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Iterate over exported names and values in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> + '_ {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Test if nothing is exported.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, Value)> for Exports {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}
