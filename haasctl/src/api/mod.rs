//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers for `/users`, `/billingAccounts` and `/apps`
//! - **[`models`]**: Request/response data structures for API communication
//! - **[`envelope`]**: The `{status, ...}` wrapper shared by every response
//! - **[`context`]**: The per-request context carrying the platform handle
//! - **[`payload`]**: Strict JSON body extraction
//!
//! All endpoints are documented with OpenAPI annotations using `utoipa`; the document is
//! served at `/api-docs/openapi.json` with a browsable UI at `/docs`.

pub mod context;
pub mod envelope;
pub mod handlers;
pub mod models;
pub mod payload;
