//! Record types for storing data.
//!
//! A record is a loosely typed JSON object. Only two fields carry meaning to
//! the engine: `id`, assigned by the server on create, and `updatedAt`, the
//! server's last-modification timestamp.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field holding the server-assigned identity.
pub const ID_FIELD: &str = "id";

/// Field holding the server's last-modification timestamp.
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// The field map of a record.
pub type Fields = Map<String, Value>;

/// Origin of a change to the bound collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Made by application code
    #[default]
    Local,
    /// Received from the server (remote event or create reconciliation)
    Remote,
}

/// A single record of a bound collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: Fields,
}

impl Record {
    /// Create an empty record (no id, not persisted).
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a record from a field map.
    pub fn from_fields(fields: Fields) -> Self {
        Self { fields }
    }

    /// Create a record from a JSON value, which must be an object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(Error::InvalidResponse(format!(
                "expected a record object, got {}",
                kind_of(&other)
            ))),
        }
    }

    /// Builder-style field setter.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Get a field value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Set a field, returning the previous value.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(field.into(), value.into())
    }

    /// Remove a field.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    /// All fields.
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// The raw `id` value, if any.
    pub fn id(&self) -> Option<&Value> {
        self.fields.get(ID_FIELD)
    }

    /// The `id` interpreted as an integer.
    pub fn numeric_id(&self) -> Option<i64> {
        self.id().and_then(parse_id)
    }

    /// Whether the record carries a server id.
    ///
    /// Absent, `null`, `false`, `0` and `""` all count as "no id".
    pub fn has_id(&self) -> bool {
        match self.id() {
            None | Some(Value::Null) | Some(Value::Bool(false)) => false,
            Some(Value::Number(n)) => n.as_f64() != Some(0.0),
            Some(Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        }
    }

    /// The raw `updatedAt` value, if any.
    pub fn updated_at(&self) -> Option<&Value> {
        self.fields.get(UPDATED_AT_FIELD)
    }

    /// Check if this record's id numerically equals `id`.
    pub fn matches_id(&self, id: &Value) -> bool {
        match (self.numeric_id(), parse_id(id)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Merge `fields` into this record. Existing fields are overwritten,
    /// fields not mentioned are kept.
    pub fn merge(&mut self, fields: &Fields) {
        for (key, value) in fields {
            self.fields.insert(key.clone(), value.clone());
        }
    }

    /// Convert into a JSON object value.
    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }

    /// Copy into a JSON object value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

impl From<Fields> for Record {
    fn from(fields: Fields) -> Self {
        Self::from_fields(fields)
    }
}

impl TryFrom<Value> for Record {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_value(value)
    }
}

/// Interpret an id value as an integer.
///
/// Numbers are truncated. Strings yield their leading integer: leading
/// whitespace is skipped, an optional sign is accepted, and parsing stops at
/// the first non-digit (`"12abc"` is 12). Anything else has no numeric id.
pub fn parse_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite())
                .map(|f| f.trunc() as i64)
        }),
        Value::String(s) => parse_leading_int(s),
        _ => None,
    }
}

fn parse_leading_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = digits
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    let magnitude: i64 = digits[..end].parse().ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
