//! Typed configuration arguments passed to `Element::configure`.
//!
//! Arguments are positional. `Args` offers typed accessors that produce a
//! `ConfigError` naming the argument's index and meaning on mismatch, so
//! element code reads as a list of "argument N is an X called Y".

use crate::router::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// A single configuration value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<ArgValue>),
}

impl ArgValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ArgValue::Bool(v) => Some(*v),
            ArgValue::Str(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ArgValue::Int(v) => Some(*v),
            ArgValue::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ArgValue::Float(v) => Some(*v),
            ArgValue::Int(v) => Some(*v as f64),
            ArgValue::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ArgValue]> {
        match self {
            ArgValue::List(v) => Some(v),
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ArgValue::Bool(_) => "boolean",
            ArgValue::Int(_) => "integer",
            ArgValue::Float(_) => "number",
            ArgValue::Str(_) => "string",
            ArgValue::List(_) => "list",
        }
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Bool(v) => write!(f, "{v}"),
            ArgValue::Int(v) => write!(f, "{v}"),
            ArgValue::Float(v) => write!(f, "{v}"),
            ArgValue::Str(v) => write!(f, "{v:?}"),
            ArgValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<bool> for ArgValue {
    fn from(v: bool) -> Self {
        ArgValue::Bool(v)
    }
}

impl From<i64> for ArgValue {
    fn from(v: i64) -> Self {
        ArgValue::Int(v)
    }
}

impl From<i32> for ArgValue {
    fn from(v: i32) -> Self {
        ArgValue::Int(v as i64)
    }
}

impl From<f64> for ArgValue {
    fn from(v: f64) -> Self {
        ArgValue::Float(v)
    }
}

impl From<&str> for ArgValue {
    fn from(v: &str) -> Self {
        ArgValue::Str(v.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(v: String) -> Self {
        ArgValue::Str(v)
    }
}

/// Positional argument list with typed, error-reporting accessors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    values: Vec<ArgValue>,
}

impl Args {
    pub fn new(values: Vec<ArgValue>) -> Self {
        Self { values }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ArgValue> {
        self.values.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ArgValue> {
        self.values.iter()
    }

    /// Fail if more than `max` arguments were supplied.
    pub fn expect_at_most(&self, max: usize) -> Result<(), ConfigError> {
        if self.values.len() > max {
            return Err(ConfigError::new(format!(
                "expected at most {max} arguments, got {}",
                self.values.len()
            )));
        }
        Ok(())
    }

    pub fn required_int(&self, index: usize, name: &str) -> Result<i64, ConfigError> {
        let value = self.required(index, name)?;
        value
            .as_int()
            .ok_or_else(|| Self::mismatch(index, name, "an integer", value))
    }

    pub fn optional_int(&self, index: usize, name: &str) -> Result<Option<i64>, ConfigError> {
        match self.values.get(index) {
            None => Ok(None),
            Some(value) => value
                .as_int()
                .map(Some)
                .ok_or_else(|| Self::mismatch(index, name, "an integer", value)),
        }
    }

    /// An integer in `0..=max`.
    pub fn optional_unsigned(
        &self,
        index: usize,
        name: &str,
        max: u64,
    ) -> Result<Option<u64>, ConfigError> {
        match self.optional_int(index, name)? {
            None => Ok(None),
            Some(v) if v >= 0 && (v as u64) <= max => Ok(Some(v as u64)),
            Some(v) => Err(ConfigError::argument(
                index,
                name,
                format!("{v} is out of range (0..={max})"),
            )),
        }
    }

    pub fn required_str(&self, index: usize, name: &str) -> Result<&str, ConfigError> {
        let value = self.required(index, name)?;
        value
            .as_str()
            .ok_or_else(|| Self::mismatch(index, name, "a string", value))
    }

    pub fn optional_str(&self, index: usize, name: &str) -> Result<Option<&str>, ConfigError> {
        match self.values.get(index) {
            None => Ok(None),
            Some(value) => value
                .as_str()
                .map(Some)
                .ok_or_else(|| Self::mismatch(index, name, "a string", value)),
        }
    }

    pub fn optional_bool(&self, index: usize, name: &str) -> Result<Option<bool>, ConfigError> {
        match self.values.get(index) {
            None => Ok(None),
            Some(value) => value
                .as_bool()
                .map(Some)
                .ok_or_else(|| Self::mismatch(index, name, "a boolean", value)),
        }
    }

    /// A duration given in (possibly fractional) seconds.
    pub fn required_seconds(&self, index: usize, name: &str) -> Result<Duration, ConfigError> {
        let value = self.required(index, name)?;
        let secs = value
            .as_float()
            .ok_or_else(|| Self::mismatch(index, name, "a delay in seconds", value))?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            ConfigError::argument(index, name, format!("{secs} is not a valid delay"))
        })
    }

    fn required(&self, index: usize, name: &str) -> Result<&ArgValue, ConfigError> {
        self.values
            .get(index)
            .ok_or_else(|| ConfigError::argument(index, name, "missing"))
    }

    fn mismatch(index: usize, name: &str, expected: &str, got: &ArgValue) -> ConfigError {
        ConfigError::argument(
            index,
            name,
            format!("expected {expected}, got {} {got}", got.kind()),
        )
    }
}

impl From<Vec<ArgValue>> for Args {
    fn from(values: Vec<ArgValue>) -> Self {
        Self::new(values)
    }
}

/// Build an `Args` list from heterogeneous literals.
///
/// ```
/// use pktgraph::args;
/// let a = args!["bytes", 10_i64, true];
/// assert_eq!(a.len(), 3);
/// ```
#[macro_export]
macro_rules! args {
    () => { $crate::router::args::Args::empty() };
    ($($value:expr),+ $(,)?) => {
        $crate::router::args::Args::new(vec![$($crate::router::args::ArgValue::from($value)),+])
    };
}
