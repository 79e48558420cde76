//! Remote change events.
//!
//! The server publishes one [`ChangeMessage`] per mutation of a resource. The
//! wire form is loose (`verb` is free text), so the handler decodes it into
//! the tagged [`RemoteEvent`] before acting on it.

use crate::error::{Error, Result};
use crate::record::{kind_of, Fields, Record};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Verbs understood by the remote event handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    Created,
    Updated,
    Destroyed,
}

impl Verb {
    /// Wire name of the verb.
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Created => "created",
            Verb::Updated => "updated",
            Verb::Destroyed => "destroyed",
        }
    }

    /// Parse a wire verb. Unrecognized verbs yield `None`.
    pub fn parse(verb: &str) -> Option<Self> {
        match verb {
            "created" => Some(Verb::Created),
            "updated" => Some(Verb::Updated),
            "destroyed" => Some(Verb::Destroyed),
            _ => None,
        }
    }
}

/// A change notification as delivered by the remote channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeMessage {
    /// What happened (`created`, `updated`, `destroyed`)
    pub verb: String,
    /// Id of the affected record
    #[serde(default)]
    pub id: Value,
    /// Full record for `created`, changed fields for `updated`
    #[serde(default)]
    pub data: Value,
}

impl ChangeMessage {
    /// Build a message from a known verb.
    pub fn new(verb: Verb, id: Value, data: Value) -> Self {
        Self {
            verb: verb.as_str().to_string(),
            id,
            data,
        }
    }

    /// A `created` notification carrying the full record.
    pub fn created(record: &Record) -> Self {
        let id = record.id().cloned().unwrap_or(Value::Null);
        Self::new(Verb::Created, id, record.to_value())
    }

    /// An `updated` notification carrying the changed fields.
    pub fn updated(id: Value, changes: Value) -> Self {
        Self::new(Verb::Updated, id, changes)
    }

    /// A `destroyed` notification.
    pub fn destroyed(id: Value) -> Self {
        Self::new(Verb::Destroyed, id, Value::Null)
    }
}

/// A decoded remote change.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteEvent {
    /// A record was created on the server
    Created { record: Record },
    /// Fields of an existing record changed
    Updated { id: Value, data: Fields },
    /// A record was removed from the server
    Destroyed { id: Value },
    /// A verb the handler has no mapping for
    Unknown { verb: String },
}

impl RemoteEvent {
    /// Decode a wire message.
    ///
    /// Unknown verbs decode successfully to [`RemoteEvent::Unknown`]; a known
    /// verb with a malformed payload is an error.
    pub fn decode(message: ChangeMessage) -> Result<Self> {
        let Some(verb) = Verb::parse(&message.verb) else {
            return Ok(RemoteEvent::Unknown {
                verb: message.verb,
            });
        };

        match verb {
            Verb::Created => Ok(RemoteEvent::Created {
                record: Record::from_value(message.data)?,
            }),
            Verb::Updated => {
                let data = match message.data {
                    Value::Object(fields) => fields,
                    Value::Null => Fields::new(),
                    other => {
                        return Err(Error::InvalidResponse(format!(
                            "updated event data must be an object, got {}",
                            kind_of(&other)
                        )))
                    }
                };
                Ok(RemoteEvent::Updated {
                    id: message.id,
                    data,
                })
            }
            Verb::Destroyed => Ok(RemoteEvent::Destroyed { id: message.id }),
        }
    }

    /// Name of the event's verb, for logging.
    pub fn verb(&self) -> &str {
        match self {
            RemoteEvent::Created { .. } => Verb::Created.as_str(),
            RemoteEvent::Updated { .. } => Verb::Updated.as_str(),
            RemoteEvent::Destroyed { .. } => Verb::Destroyed.as_str(),
            RemoteEvent::Unknown { verb } => verb,
        }
    }
}
