//! Per-request context carrying the shared platform handle.
//!
//! [`attach_request_context`] runs in front of every API route and inserts a
//! [`RequestContext`] into the request extensions; handlers take it as an extractor.

use std::time::Duration;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::time::Instant;
use tracing::trace;

use crate::{errors::Error, platform::PlatformHandle};

/// Clients may ask for a shorter deadline than the configured one, never a longer one
pub const REQUEST_TIMEOUT_HEADER: &str = "x-request-timeout";

/// What every request gets handed: the platform connection and the time by which any
/// platform call made on its behalf must finish.
#[derive(Clone)]
pub struct RequestContext {
    pub platform: PlatformHandle,
    pub deadline: Instant,
}

/// State for [`attach_request_context`]
#[derive(Clone)]
pub struct ContextSource {
    pub platform: PlatformHandle,
    pub request_timeout: Duration,
}

impl ContextSource {
    fn deadline(&self, headers: &HeaderMap) -> Result<Instant, Error> {
        let mut timeout = self.request_timeout;

        if let Some(value) = headers.get(REQUEST_TIMEOUT_HEADER) {
            let requested = value
                .to_str()
                .ok()
                .and_then(|v| humantime::parse_duration(v.trim()).ok())
                .ok_or_else(|| Error::Validation {
                    message: "Invalid X-Request-Timeout header".to_string(),
                })?;
            timeout = timeout.min(requested);
        }

        Ok(Instant::now() + timeout)
    }
}

/// Middleware inserting a [`RequestContext`] into the request
pub async fn attach_request_context(State(source): State<ContextSource>, mut request: Request, next: Next) -> Response {
    let deadline = match source.deadline(request.headers()) {
        Ok(deadline) => deadline,
        Err(e) => return e.into_response(),
    };

    trace!(
        remaining = ?deadline.saturating_duration_since(Instant::now()),
        platform_connected = source.platform.is_connected(),
        "Attaching request context"
    );
    request.extensions_mut().insert(RequestContext {
        platform: source.platform.clone(),
        deadline,
    });
    next.run(request).await
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<RequestContext>().cloned().ok_or_else(|| Error::Internal {
            operation: "find request context, route is missing the context middleware".to_string(),
        })
    }
}
