//! Repository implementations for database access.
//!
//! Each repository:
//! - Wraps a SQLx connection or transaction
//! - Provides strongly-typed CRUD operations
//! - Returns domain models from [`crate::db::models`]
//!
//! # Available Repositories
//!
//! - [`Users`]: Platform account holders
//! - [`BillingAccounts`]: Billing entities and user memberships
//! - [`Apps`]: Hosted app records
//!
//! # Common Pattern
//!
//! ```ignore
//! use haasctl::db::handlers::{Users, Repository};
//!
//! async fn example(pool: &sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
//!     let mut conn = pool.acquire().await?;
//!     let mut repo = Users::new(&mut conn);
//!     let users = repo.list(&UserFilter::new(0, 10)).await?;
//!     Ok(())
//! }
//! ```

pub mod apps;
pub mod billing_accounts;
pub mod repository;
pub mod users;

pub use apps::Apps;
pub use billing_accounts::BillingAccounts;
pub use repository::Repository;
pub use users::Users;
