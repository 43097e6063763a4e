//! Request extractors that reject with the error envelope.
//!
//! axum's own extractors answer bad input with plain-text bodies. These wrap them so every
//! rejection goes through [`Error`] instead.

use axum::{
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Request},
    http::request::Parts,
};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::errors::Error;

/// A request body decoded as JSON regardless of its `Content-Type`.
///
/// Any failure, whether reading the body or decoding it into `T`, is rejected with a 400
/// `Invalid JSON` error. Strictness (unknown or missing fields) comes from `T`'s serde
/// attributes.
#[derive(Debug, Clone)]
pub struct Payload<T>(pub T);

impl<S, T> FromRequest<S> for Payload<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state).await.map_err(|e| {
            debug!(error = %e, "Failed to read request body");
            Error::invalid_json()
        })?;

        serde_json::from_slice(&bytes).map(Payload).map_err(|e| {
            debug!(error = %e, "Rejected request body");
            Error::invalid_json()
        })
    }
}

/// [`axum::extract::Path`], rejecting unparsable segments with a 400 error envelope
#[derive(Debug, Clone)]
pub struct Path<T>(pub T);

impl<S, T> FromRequestParts<S> for Path<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        axum::extract::Path::<T>::from_request_parts(parts, state)
            .await
            .map(|axum::extract::Path(value)| Path(value))
            .map_err(|rejection| Error::Validation {
                message: rejection.body_text(),
            })
    }
}

/// [`axum::extract::Query`], rejecting invalid query strings with a 400 error envelope
#[derive(Debug, Clone)]
pub struct Query<T>(pub T);

impl<S, T> FromRequestParts<S> for Query<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        axum::extract::Query::<T>::from_request_parts(parts, state)
            .await
            .map(|axum::extract::Query(value)| Query(value))
            .map_err(|rejection| Error::Validation {
                message: rejection.body_text(),
            })
    }
}
