//! Database repository for hosted apps.

use crate::api::models::apps::AppStatus;
use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::apps::{AppCreateDBRequest, AppDBResponse},
};
use crate::types::{abbrev_uuid, AppId, BillingAccountId};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};
use tracing::instrument;
use uuid::Uuid;

/// Filter for listing apps
#[derive(Debug, Clone)]
pub struct AppFilter {
    pub skip: i64,
    pub limit: i64,
    /// Only return apps owned by this billing account
    pub billing_account_id: Option<BillingAccountId>,
}

impl AppFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self {
            skip,
            limit,
            billing_account_id: None,
        }
    }

    pub fn with_billing_account(mut self, billing_account_id: BillingAccountId) -> Self {
        self.billing_account_id = Some(billing_account_id);
        self
    }
}

#[derive(Debug, Clone, FromRow)]
struct App {
    pub id: AppId,
    pub name: String,
    pub short_name: String,
    pub billing_account_id: BillingAccountId,
    pub status: AppStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<App> for AppDBResponse {
    fn from(app: App) -> Self {
        Self {
            id: app.id,
            name: app.name,
            short_name: app.short_name,
            billing_account_id: app.billing_account_id,
            status: app.status,
            created_at: app.created_at,
            updated_at: app.updated_at,
        }
    }
}

const APP_COLUMNS: &str = "id, name, short_name, billing_account_id, status, created_at, updated_at";

pub struct Apps<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Apps<'c> {
    type CreateRequest = AppCreateDBRequest;
    type Response = AppDBResponse;
    type Id = AppId;
    type Filter = AppFilter;

    #[instrument(skip(self, request), fields(short_name = %request.short_name), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let app = sqlx::query_as::<_, App>(&format!(
            r#"
            INSERT INTO apps (id, name, short_name, billing_account_id, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {APP_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&request.name)
        .bind(&request.short_name)
        .bind(request.billing_account_id)
        .bind(AppStatus::Pending)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(app.into())
    }

    #[instrument(skip(self), fields(app_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let app = sqlx::query_as::<_, App>(&format!("SELECT {APP_COLUMNS} FROM apps WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(app.map(AppDBResponse::from))
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let apps = sqlx::query_as::<_, App>(&format!(
            r#"
            SELECT {APP_COLUMNS} FROM apps
            WHERE ($1::uuid IS NULL OR billing_account_id = $1)
            ORDER BY created_at DESC, id
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(filter.billing_account_id)
        .bind(filter.limit)
        .bind(filter.skip)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(apps.into_iter().map(AppDBResponse::from).collect())
    }

    #[instrument(skip(self), fields(app_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM apps WHERE id = $1").bind(id).execute(&mut *self.db).await?;

        Ok(result.rows_affected() > 0)
    }
}

impl<'c> Apps<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Record the outcome of a provisioning attempt
    #[instrument(skip(self), fields(app_id = %abbrev_uuid(&id)), err)]
    pub async fn set_status(&mut self, id: AppId, status: AppStatus) -> Result<AppDBResponse> {
        let app = sqlx::query_as::<_, App>(&format!(
            "UPDATE apps SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING {APP_COLUMNS}"
        ))
        .bind(id)
        .bind(status)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(app.into())
    }
}
