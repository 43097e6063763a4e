//! The resource store used by request handlers.
//!
//! [`ResourceStore`] is the seam between handlers and persistence. Handlers only ever see an
//! `Arc<dyn ResourceStore>`, which lets tests substitute an in-memory store (see
//! `test_utils::MemoryStore`). [`PgStore`] is the production implementation: every call
//! acquires a pooled connection and delegates to the matching repository in
//! [`crate::db::handlers`].

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::api::models::apps::AppStatus;
use crate::db::{
    errors::Result,
    handlers::{
        apps::AppFilter, billing_accounts::BillingAccountFilter, users::UserFilter, Apps, BillingAccounts, Repository, Users,
    },
    models::{
        apps::{AppCreateDBRequest, AppDBResponse},
        billing_accounts::{BillingAccountCreateDBRequest, BillingAccountDBResponse},
        users::{UserCreateDBRequest, UserDBResponse},
    },
};
use crate::types::{AppId, BillingAccountId, UserId};

/// Shared handle to the resource store
pub type StoreHandle = Arc<dyn ResourceStore>;

/// Durable storage for users, billing accounts and apps.
///
/// Implementations must be safe to call from many request tasks at once. Uniqueness of
/// `slack_user_id` and `short_name` is enforced here, surfacing as
/// [`DbError::UniqueViolation`](crate::db::errors::DbError::UniqueViolation).
#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn create_user(&self, request: &UserCreateDBRequest) -> Result<UserDBResponse>;
    async fn get_user(&self, id: UserId) -> Result<Option<UserDBResponse>>;
    async fn list_users(&self, filter: &UserFilter) -> Result<Vec<UserDBResponse>>;
    /// Billing accounts the user is a member of
    async fn list_user_billing_accounts(&self, user_id: UserId) -> Result<Vec<BillingAccountDBResponse>>;

    async fn create_billing_account(&self, request: &BillingAccountCreateDBRequest) -> Result<BillingAccountDBResponse>;
    async fn get_billing_account(&self, id: BillingAccountId) -> Result<Option<BillingAccountDBResponse>>;
    async fn list_billing_accounts(&self, filter: &BillingAccountFilter) -> Result<Vec<BillingAccountDBResponse>>;
    /// Returns `false` if the user already belonged to the account
    async fn add_billing_account_user(&self, billing_account_id: BillingAccountId, user_id: UserId) -> Result<bool>;
    async fn list_billing_account_users(&self, billing_account_id: BillingAccountId) -> Result<Vec<UserDBResponse>>;

    /// Insert a new app record in the `pending` state
    async fn create_app(&self, request: &AppCreateDBRequest) -> Result<AppDBResponse>;
    async fn get_app(&self, id: AppId) -> Result<Option<AppDBResponse>>;
    async fn list_apps(&self, filter: &AppFilter) -> Result<Vec<AppDBResponse>>;
    async fn set_app_status(&self, id: AppId, status: AppStatus) -> Result<AppDBResponse>;
    async fn delete_app(&self, id: AppId) -> Result<bool>;
}

/// PostgreSQL-backed [`ResourceStore`]
#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ResourceStore for PgStore {
    async fn create_user(&self, request: &UserCreateDBRequest) -> Result<UserDBResponse> {
        let mut conn = self.pool.acquire().await?;
        Users::new(&mut conn).create(request).await
    }

    async fn get_user(&self, id: UserId) -> Result<Option<UserDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Users::new(&mut conn).get_by_id(id).await
    }

    async fn list_users(&self, filter: &UserFilter) -> Result<Vec<UserDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Users::new(&mut conn).list(filter).await
    }

    async fn list_user_billing_accounts(&self, user_id: UserId) -> Result<Vec<BillingAccountDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        BillingAccounts::new(&mut conn).list_by_user(user_id).await
    }

    async fn create_billing_account(&self, request: &BillingAccountCreateDBRequest) -> Result<BillingAccountDBResponse> {
        let mut conn = self.pool.acquire().await?;
        BillingAccounts::new(&mut conn).create(request).await
    }

    async fn get_billing_account(&self, id: BillingAccountId) -> Result<Option<BillingAccountDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        BillingAccounts::new(&mut conn).get_by_id(id).await
    }

    async fn list_billing_accounts(&self, filter: &BillingAccountFilter) -> Result<Vec<BillingAccountDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        BillingAccounts::new(&mut conn).list(filter).await
    }

    async fn add_billing_account_user(&self, billing_account_id: BillingAccountId, user_id: UserId) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        BillingAccounts::new(&mut conn).add_user(billing_account_id, user_id).await
    }

    async fn list_billing_account_users(&self, billing_account_id: BillingAccountId) -> Result<Vec<UserDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Users::new(&mut conn).list_by_billing_account(billing_account_id).await
    }

    async fn create_app(&self, request: &AppCreateDBRequest) -> Result<AppDBResponse> {
        let mut conn = self.pool.acquire().await?;
        Apps::new(&mut conn).create(request).await
    }

    async fn get_app(&self, id: AppId) -> Result<Option<AppDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Apps::new(&mut conn).get_by_id(id).await
    }

    async fn list_apps(&self, filter: &AppFilter) -> Result<Vec<AppDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Apps::new(&mut conn).list(filter).await
    }

    async fn set_app_status(&self, id: AppId, status: AppStatus) -> Result<AppDBResponse> {
        let mut conn = self.pool.acquire().await?;
        Apps::new(&mut conn).set_status(id, status).await
    }

    async fn delete_app(&self, id: AppId) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        Apps::new(&mut conn).delete(id).await
    }
}
