//! Schemas that only exist for documentation.
//!
//! Handlers build envelopes with [`crate::api::envelope`]; these types describe the shapes it
//! produces so the OpenAPI document can reference them.

use serde::Serialize;
use utoipa::ToSchema;

/// Body of every failed request.
#[derive(Debug, Serialize, ToSchema)]
#[schema(example = json!({
    "status": "error",
    "message": "Invalid JSON"
}))]
pub struct ErrorEnvelope {
    /// Always `error`
    #[schema(example = "error")]
    pub status: String,
    /// What went wrong. Store and platform failures carry the backend's error text.
    pub message: String,
}
