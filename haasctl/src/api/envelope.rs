//! The `{status, ...}` wrapper every API response is sent in.
//!
//! Success: `{"status": "ok", "<key>": <payload>}`. Failure:
//! `{"status": "error", "message": "..."}`, produced only by [`crate::errors::Error`].

use axum::Json;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::errors::{Error, Result};

pub const STATUS_OK: &str = "ok";
pub const STATUS_ERROR: &str = "error";

/// Wrap a payload under `key` in a success envelope
pub fn ok<T: Serialize>(key: &str, payload: T) -> Result<Json<Value>> {
    let payload = serde_json::to_value(payload).map_err(|e| Error::Internal {
        operation: format!("serialize {key} response: {e}"),
    })?;

    let mut body = Map::new();
    body.insert("status".to_string(), Value::from(STATUS_OK));
    body.insert(key.to_string(), payload);
    Ok(Json(Value::Object(body)))
}

/// The body of an error response
pub fn error(message: impl Into<String>) -> Value {
    let mut body = Map::new();
    body.insert("status".to_string(), Value::from(STATUS_ERROR));
    body.insert("message".to_string(), Value::from(message.into()));
    Value::Object(body)
}
