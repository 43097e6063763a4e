//! API request and response data models.
//!
//! These structures define the public JSON contract and are kept separate from the
//! database models in [`crate::db::models`]. Request bodies are decoded strictly: unknown
//! fields are rejected and every field is required. Field names follow the PascalCase
//! convention of the service's clients (`ID`, `SlackUserID`, `ShortName`, ...).
//!
//! - [`users`]: user creation and responses
//! - [`billing_accounts`]: billing account creation and responses
//! - [`apps`]: app creation, provisioning status and responses
//! - [`pagination`]: `skip`/`limit` query parameters shared by list endpoints

pub mod apps;
pub mod billing_accounts;
pub mod pagination;
pub mod users;
