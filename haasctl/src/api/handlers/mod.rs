//! HTTP request handlers for all API endpoints.
//!
//! Each handler decodes its input, calls the resource store and (for apps) the platform, and
//! answers with an [`envelope`](crate::api::envelope). Failures are returned as
//! [`crate::errors::Error`], which renders the error envelope with a matching status code.
//!
//! - [`root`]: `GET /` service diagnostics
//! - [`users`]: user creation, lookup and billing account listing
//! - [`billing_accounts`]: billing accounts and their memberships
//! - [`apps`]: app provisioning, lookup and deletion

pub mod apps;
pub mod billing_accounts;
pub mod root;
pub mod users;
