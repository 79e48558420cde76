//! In-memory resource store.
//!
//! One table per resource, keyed by integer id. Ids are assigned on create
//! and never reused. Every mutation returns the [`ChangeMessage`] that
//! subscribers of the resource should receive.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use dashmap::DashMap;
use serde_json::{Map, Value};
use tether_engine::record::{parse_id, ID_FIELD, UPDATED_AT_FIELD};
use tether_engine::{ChangeMessage, Record};

use crate::error::{AppError, Result};

/// Field holding the creation timestamp.
pub const CREATED_AT_FIELD: &str = "createdAt";

/// Query keys that are not field criteria.
const RESERVED: [&str; 4] = ["where", "sort", "limit", "skip"];

/// A mutation and the notification describing it.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub record: Record,
    pub message: ChangeMessage,
}

#[derive(Debug, Default)]
struct Table {
    last_id: u64,
    records: BTreeMap<u64, Record>,
}

/// Thread-safe store of resource tables.
#[derive(Debug, Default)]
pub struct ResourceStore {
    tables: DashMap<String, Table>,
}

impl ResourceStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new store wrapped in Arc for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register a resource without adding records.
    pub fn ensure(&self, resource: &str) {
        self.tables.entry(resource.to_string()).or_default();
    }

    /// Names of all known resources, sorted.
    pub fn resources(&self) -> Vec<String> {
        let mut names: Vec<_> = self.tables.iter().map(|t| t.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of records in a resource.
    pub fn count(&self, resource: &str) -> usize {
        self.tables
            .get(resource)
            .map(|table| table.records.len())
            .unwrap_or(0)
    }

    /// Find records matching `query`.
    ///
    /// `query` is an object. `where` (an object, or a JSON string of one)
    /// holds field criteria; any other key outside `sort`, `limit` and `skip`
    /// is a criterion too. A criterion matches on equality, ids and numbers
    /// compared numerically; an array criterion matches any of its members.
    /// `sort` is `"field ASC|DESC"` or `{field: 1|-1}`.
    pub fn find(&self, resource: &str, query: &Value) -> Result<Vec<Record>> {
        let query = match query {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            _ => return Err(AppError::BadRequest("query must be an object".into())),
        };

        let criteria = criteria(&query)?;
        let mut found: Vec<Record> = match self.tables.get(resource) {
            Some(table) => table
                .records
                .values()
                .filter(|record| matches(record, &criteria))
                .cloned()
                .collect(),
            None => Vec::new(),
        };

        if let Some(sort) = query.get("sort") {
            let keys = sort_keys(sort)?;
            found.sort_by(|a, b| {
                keys.iter()
                    .map(|(field, descending)| {
                        let ordering = compare(
                            a.get(field).unwrap_or(&Value::Null),
                            b.get(field).unwrap_or(&Value::Null),
                        );
                        if *descending {
                            ordering.reverse()
                        } else {
                            ordering
                        }
                    })
                    .find(|ordering| *ordering != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            });
        }

        let skip = count_param(&query, "skip")?.unwrap_or(0);
        let limit = count_param(&query, "limit")?.unwrap_or(usize::MAX);
        Ok(found.into_iter().skip(skip).take(limit).collect())
    }

    /// Find one record by id.
    pub fn find_one(&self, resource: &str, id: &Value) -> Result<Record> {
        let key = record_key(resource, id)?;
        self.tables
            .get(resource)
            .and_then(|table| table.records.get(&key).cloned())
            .ok_or_else(|| not_found(resource, id))
    }

    /// Create a record, assigning `id`, `createdAt` and `updatedAt`.
    pub fn create(&self, resource: &str, fields: Value) -> Result<Change> {
        let mut fields = object(fields)?;
        fields.remove(ID_FIELD);

        let mut table = self.tables.entry(resource.to_string()).or_default();
        table.last_id += 1;
        let id = table.last_id;

        let now = timestamp();
        let record = Record::from_fields(fields)
            .with(ID_FIELD, id)
            .with(CREATED_AT_FIELD, now.clone())
            .with(UPDATED_AT_FIELD, now);
        table.records.insert(id, record.clone());

        tracing::debug!(resource = %resource, id, "Record created");
        let message = ChangeMessage::created(&record);
        Ok(Change { record, message })
    }

    /// Merge `fields` into a record and refresh its `updatedAt`.
    ///
    /// `id`, `createdAt` and `updatedAt` in `fields` are ignored.
    pub fn update(&self, resource: &str, id: &Value, fields: Value) -> Result<Change> {
        let mut changes = object(fields)?;
        for field in [ID_FIELD, CREATED_AT_FIELD, UPDATED_AT_FIELD] {
            changes.remove(field);
        }
        changes.insert(UPDATED_AT_FIELD.to_string(), Value::String(timestamp()));

        let key = record_key(resource, id)?;
        let mut table = self
            .tables
            .get_mut(resource)
            .ok_or_else(|| not_found(resource, id))?;
        let record = table
            .records
            .get_mut(&key)
            .ok_or_else(|| not_found(resource, id))?;
        record.merge(&changes);
        let record = record.clone();

        tracing::debug!(resource = %resource, id = key, "Record updated");
        let message = ChangeMessage::updated(Value::from(key), Value::Object(changes));
        Ok(Change { record, message })
    }

    /// Remove a record.
    pub fn destroy(&self, resource: &str, id: &Value) -> Result<Change> {
        let key = record_key(resource, id)?;
        let record = self
            .tables
            .get_mut(resource)
            .and_then(|mut table| table.records.remove(&key))
            .ok_or_else(|| not_found(resource, id))?;

        tracing::debug!(resource = %resource, id = key, "Record destroyed");
        let message = ChangeMessage::destroyed(Value::from(key));
        Ok(Change { record, message })
    }
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn not_found(resource: &str, id: &Value) -> AppError {
    AppError::NotFound(format!("no {} with id {}", resource, id))
}

fn record_key(resource: &str, id: &Value) -> Result<u64> {
    parse_id(id)
        .and_then(|id| u64::try_from(id).ok())
        .ok_or_else(|| not_found(resource, id))
}

fn object(value: Value) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        _ => Err(AppError::BadRequest("record fields must be an object".into())),
    }
}

fn criteria(query: &Map<String, Value>) -> Result<Map<String, Value>> {
    let mut criteria = match query.get("where") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(Value::String(text)) => match serde_json::from_str(text) {
            Ok(Value::Object(map)) => map,
            _ => return Err(AppError::BadRequest("`where` must be a JSON object".into())),
        },
        Some(_) => return Err(AppError::BadRequest("`where` must be an object".into())),
    };
    for (key, value) in query {
        if !RESERVED.contains(&key.as_str()) {
            criteria.insert(key.clone(), value.clone());
        }
    }
    Ok(criteria)
}

fn matches(record: &Record, criteria: &Map<String, Value>) -> bool {
    criteria.iter().all(|(field, expected)| {
        let actual = record.get(field).unwrap_or(&Value::Null);
        match expected {
            Value::Array(options) => options.iter().any(|option| loosely_equal(actual, option)),
            _ => loosely_equal(actual, expected),
        }
    })
}

fn loosely_equal(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (a, b) {
        (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
            match (as_number(a), as_number(b)) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            }
        }
        _ => false,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn sort_keys(sort: &Value) -> Result<Vec<(String, bool)>> {
    let invalid = || AppError::BadRequest("`sort` must be \"field ASC|DESC\" or an object".into());
    match sort {
        Value::String(text) => {
            let mut parts = text.split_whitespace();
            let field = parts.next().ok_or_else(invalid)?;
            let descending = match parts.next().map(str::to_ascii_uppercase).as_deref() {
                None | Some("ASC") => false,
                Some("DESC") => true,
                Some(_) => return Err(invalid()),
            };
            Ok(vec![(field.to_string(), descending)])
        }
        Value::Object(map) => map
            .iter()
            .map(|(field, direction)| {
                let descending = match direction {
                    Value::Number(n) => n.as_f64().map(|d| d < 0.0).ok_or_else(invalid)?,
                    Value::String(s) => s.eq_ignore_ascii_case("desc"),
                    _ => return Err(invalid()),
                };
                Ok((field.clone(), descending))
            })
            .collect(),
        _ => Err(invalid()),
    }
}

fn count_param(query: &Map<String, Value>, key: &str) -> Result<Option<usize>> {
    match query.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => as_number(value)
            .filter(|n| *n >= 0.0)
            .map(|n| Some(n as usize))
            .ok_or_else(|| AppError::BadRequest(format!("`{}` must be a non-negative number", key))),
    }
}

/// Total order over JSON values: null, booleans, numbers, strings, then the rest.
fn compare(a: &Value, b: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}
