//! Database record models matching table schemas.
//!
//! This module contains the request and response structs used by repositories. They are
//! distinct from the API models in [`crate::api::models`] so storage and wire
//! representations can evolve independently.
//!
//! - [`users`]: Platform account holders
//! - [`billing_accounts`]: Billing entities and their user memberships
//! - [`apps`]: Hosted app records and their provisioning status
//!
//! Database models implement `From` conversions to and from API models:
//!
//! ```ignore
//! use haasctl::api::models::users::UserResponse;
//!
//! let db_user: UserDBResponse = /* ... */;
//! let api_response: UserResponse = db_user.into();
//! ```

pub mod apps;
pub mod billing_accounts;
pub mod users;
