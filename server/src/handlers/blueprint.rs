//! Blueprint dispatch - maps conventional resource requests onto the store.
//!
//! | Method        | Path                     | Action   |
//! |---------------|--------------------------|----------|
//! | GET           | `/<r>`                   | find     |
//! | GET           | `/<r>/<id>`              | find one |
//! | POST          | `/<r>`                   | create   |
//! | PUT, POST     | `/<r>/create`            | create   |
//! | POST, PUT     | `/<r>/update/<id>`       | update   |
//! | PUT           | `/<r>/<id>`              | update   |
//! | DELETE, POST  | `/<r>/destroy/<id>`      | destroy  |
//! | DELETE        | `/<r>/<id>`              | destroy  |
//!
//! A find carrying an `id` parameter answers with that single record.

use serde_json::Value;
use tether_engine::{Method, Record, Request, Resource};

use crate::error::{AppError, Result};
use crate::AppState;

/// What a request asks of a resource.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Find,
    FindOne(Value),
    Create,
    Update(Value),
    Destroy(Value),
}

/// Resolve a method and path to a resource and action.
pub fn resolve(method: Method, path: &str) -> Result<(Resource, Action)> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let Some(name) = segments.first() else {
        return Err(AppError::BadRequest("missing resource in path".into()));
    };

    let action = match (method, &segments[1..]) {
        (Method::Get, []) => Action::Find,
        (Method::Post, []) => Action::Create,
        (Method::Put | Method::Post, ["create"]) => Action::Create,
        (Method::Post | Method::Put, ["update", target]) => Action::Update(id(target)),
        (Method::Delete | Method::Post, ["destroy", target]) => Action::Destroy(id(target)),
        (Method::Get, [target]) => Action::FindOne(id(target)),
        (Method::Put, [target]) => Action::Update(id(target)),
        (Method::Delete, [target]) => Action::Destroy(id(target)),
        _ => {
            return Err(AppError::MethodNotAllowed(format!(
                "no route for {:?} {}",
                method, path
            )))
        }
    };

    Ok((Resource::new(*name)?, action))
}

/// Serve a blueprint request.
///
/// `origin` is the connection the request came through, if any; it is left
/// out when the resulting change is published.
pub fn dispatch(state: &AppState, origin: Option<&str>, request: Request) -> Result<Value> {
    let (resource, action) = resolve(request.method, &request.path)?;
    let name = resource.name();

    tracing::debug!(
        resource = %name,
        action = ?action,
        origin = ?origin,
        "Blueprint request"
    );

    match action {
        Action::Find => match request.params.get("id").filter(|id| !id.is_null()) {
            Some(id) => Ok(state.store.find_one(name, id)?.into_value()),
            None => {
                let records = state.store.find(name, &request.params)?;
                Ok(Value::Array(
                    records.into_iter().map(Record::into_value).collect(),
                ))
            }
        },
        Action::FindOne(id) => Ok(state.store.find_one(name, &id)?.into_value()),
        Action::Create => {
            let change = state.store.create(name, request.params)?;
            state.hub.publish(name, origin, &change.message);
            Ok(change.record.into_value())
        }
        Action::Update(id) => {
            let change = state.store.update(name, &id, request.params)?;
            state.hub.publish(name, origin, &change.message);
            Ok(change.record.into_value())
        }
        Action::Destroy(id) => {
            let change = state.store.destroy(name, &id)?;
            state.hub.publish(name, origin, &change.message);
            Ok(change.record.into_value())
        }
    }
}

fn id(segment: &str) -> Value {
    Value::String(segment.to_string())
}
