//! Database repository for billing accounts and their user memberships.

use crate::db::{
    errors::Result,
    handlers::repository::Repository,
    models::billing_accounts::{BillingAccountCreateDBRequest, BillingAccountDBResponse},
};
use crate::types::{abbrev_uuid, BillingAccountId, UserId};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};
use tracing::instrument;
use uuid::Uuid;

/// Filter for listing billing accounts
#[derive(Debug, Clone)]
pub struct BillingAccountFilter {
    pub skip: i64,
    pub limit: i64,
}

impl BillingAccountFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self { skip, limit }
    }
}

#[derive(Debug, Clone, FromRow)]
struct BillingAccount {
    pub id: BillingAccountId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<BillingAccount> for BillingAccountDBResponse {
    fn from(account: BillingAccount) -> Self {
        Self {
            id: account.id,
            name: account.name,
            created_at: account.created_at,
            updated_at: account.updated_at,
        }
    }
}

pub struct BillingAccounts<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for BillingAccounts<'c> {
    type CreateRequest = BillingAccountCreateDBRequest;
    type Response = BillingAccountDBResponse;
    type Id = BillingAccountId;
    type Filter = BillingAccountFilter;

    #[instrument(skip(self, request), fields(name = %request.name), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let account = sqlx::query_as::<_, BillingAccount>(
            r#"
            INSERT INTO billing_accounts (id, name)
            VALUES ($1, $2)
            RETURNING id, name, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&request.name)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(account.into())
    }

    #[instrument(skip(self), fields(billing_account_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let account =
            sqlx::query_as::<_, BillingAccount>("SELECT id, name, created_at, updated_at FROM billing_accounts WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut *self.db)
                .await?;

        Ok(account.map(BillingAccountDBResponse::from))
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let accounts = sqlx::query_as::<_, BillingAccount>(
            "SELECT id, name, created_at, updated_at FROM billing_accounts ORDER BY created_at DESC, id LIMIT $1 OFFSET $2",
        )
        .bind(filter.limit)
        .bind(filter.skip)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(accounts.into_iter().map(BillingAccountDBResponse::from).collect())
    }

    #[instrument(skip(self), fields(billing_account_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM billing_accounts WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

impl<'c> BillingAccounts<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Add a user to a billing account.
    ///
    /// Returns `false` when the user was already a member.
    #[instrument(skip(self), fields(billing_account_id = %abbrev_uuid(&billing_account_id), user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn add_user(&mut self, billing_account_id: BillingAccountId, user_id: UserId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO billing_account_users (billing_account_id, user_id)
            VALUES ($1, $2)
            ON CONFLICT (billing_account_id, user_id) DO NOTHING
            "#,
        )
        .bind(billing_account_id)
        .bind(user_id)
        .execute(&mut *self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Billing accounts the given user is a member of
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn list_by_user(&mut self, user_id: UserId) -> Result<Vec<BillingAccountDBResponse>> {
        let accounts = sqlx::query_as::<_, BillingAccount>(
            r#"
            SELECT ba.id, ba.name, ba.created_at, ba.updated_at
            FROM billing_accounts ba
            JOIN billing_account_users bau ON bau.billing_account_id = ba.id
            WHERE bau.user_id = $1
            ORDER BY bau.created_at, ba.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(accounts.into_iter().map(BillingAccountDBResponse::from).collect())
    }
}
