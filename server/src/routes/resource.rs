//! Blueprint resource routes and the WebSocket endpoint.

use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::{Query, State, WebSocketUpgrade},
    http::{Method as HttpMethod, Uri},
    response::IntoResponse,
    routing::{any, get},
    Json, Router,
};
use serde_json::{Map, Value};
use tether_engine::{Method, Request};

use crate::error::{AppError, Result};
use crate::handlers::{dispatch, handle_websocket_connection};
use crate::AppState;

/// Create resource routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(websocket_handler))
        .route("/{resource}", any(blueprint_handler))
        .route("/{resource}/{id}", any(blueprint_handler))
        .route("/{resource}/{action}/{id}", any(blueprint_handler))
}

/// GET /ws - Upgrade to a realtime connection.
async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket_connection(socket, state))
}

/// Any blueprint route.
///
/// Parameters come from the query string, with a JSON body merged over them.
async fn blueprint_handler(
    State(state): State<AppState>,
    method: HttpMethod,
    uri: Uri,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Result<Json<Value>> {
    let method = blueprint_method(&method)?;

    let mut params = query_params(query);
    if !body.is_empty() {
        match serde_json::from_slice(&body) {
            Ok(Value::Object(fields)) => params.extend(fields),
            Ok(Value::Null) => {}
            Ok(_) => return Err(AppError::BadRequest("body must be a JSON object".into())),
            Err(e) => return Err(AppError::BadRequest(format!("invalid JSON body: {}", e))),
        }
    }

    let response = dispatch(
        &state,
        None,
        Request::new(method, uri.path(), Value::Object(params)),
    )?;
    Ok(Json(response))
}

fn blueprint_method(method: &HttpMethod) -> Result<Method> {
    match method {
        &HttpMethod::GET => Ok(Method::Get),
        &HttpMethod::POST => Ok(Method::Post),
        &HttpMethod::PUT => Ok(Method::Put),
        &HttpMethod::DELETE => Ok(Method::Delete),
        _ => Err(AppError::MethodNotAllowed(method.to_string())),
    }
}

/// Query values are JSON when they parse as JSON (`limit=10`,
/// `where={"a":1}`), plain strings otherwise.
fn query_params(query: HashMap<String, String>) -> Map<String, Value> {
    query
        .into_iter()
        .map(|(key, raw)| {
            let value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
            (key, value)
        })
        .collect()
}
