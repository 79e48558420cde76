//! Resource names and their conventional request paths.

use crate::error::{Error, Result};
use serde_json::Value;
use std::fmt;

/// A server resource a collection can be bound to.
///
/// Requests follow the blueprint conventions:
///
/// | Action   | Path                      |
/// |----------|---------------------------|
/// | find     | `/<name>`                 |
/// | find one | `/<name>/<id>`            |
/// | create   | `/<name>/create`          |
/// | update   | `/<name>/update/<id>`     |
/// | destroy  | `/<name>/destroy/<id>`    |
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Resource {
    name: String,
}

impl Resource {
    /// Validate and wrap a resource name.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() || name.contains('/') || name.chars().any(char::is_whitespace) {
            return Err(Error::InvalidResource(name));
        }
        Ok(Self { name })
    }

    /// The resource name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the bound collection: the resource name plus `suffix`.
    pub fn collection_name(&self, suffix: &str) -> String {
        format!("{}{}", self.name, suffix)
    }

    pub fn find_path(&self) -> String {
        format!("/{}", self.name)
    }

    pub fn find_one_path(&self, id: &Value) -> String {
        format!("/{}/{}", self.name, id_segment(id))
    }

    pub fn create_path(&self) -> String {
        format!("/{}/create", self.name)
    }

    pub fn update_path(&self, id: &Value) -> String {
        format!("/{}/update/{}", self.name, id_segment(id))
    }

    pub fn destroy_path(&self, id: &Value) -> String {
        format!("/{}/destroy/{}", self.name, id_segment(id))
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Render an id as a path segment (strings verbatim, other values as JSON).
pub fn id_segment(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
