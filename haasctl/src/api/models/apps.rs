//! API request/response models for hosted apps.

use crate::db::models::apps::AppDBResponse;
use crate::types::{AppId, BillingAccountId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Provisioning state of an app record.
///
/// A record is `pending` from insertion until the platform has answered. A record left
/// `pending` means the outcome was never recorded and needs reconciling against the platform.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "app_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AppStatus {
    Pending,
    Active,
    Failed,
}

/// Body of `POST /apps`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct AppCreate {
    /// Display name
    pub name: String,
    /// Instance name on the platform: lowercase letters, digits and `-`, starting with a
    /// letter, at most 63 characters
    pub short_name: String,
    #[serde(rename = "BillingAccountID")]
    #[schema(value_type = String, format = "uuid")]
    pub billing_account_id: BillingAccountId,
}

impl AppCreate {
    /// Check the fields that decoding alone cannot, returning a client-facing message
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Name must not be empty".to_string());
        }
        if !is_valid_short_name(&self.short_name) {
            return Err(format!(
                "ShortName {:?} must be 1-63 lowercase letters, digits or '-', starting with a letter",
                self.short_name
            ));
        }
        Ok(())
    }
}

/// `^[a-z][a-z0-9-]{0,62}$`
pub fn is_valid_short_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_lowercase() => {}
        _ => return false,
    }
    name.len() <= 63 && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub struct AppResponse {
    #[serde(rename = "ID")]
    #[schema(value_type = String, format = "uuid")]
    pub id: AppId,
    pub name: String,
    pub short_name: String,
    #[serde(rename = "BillingAccountID")]
    #[schema(value_type = String, format = "uuid")]
    pub billing_account_id: BillingAccountId,
    pub status: AppStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<AppDBResponse> for AppResponse {
    fn from(db: AppDBResponse) -> Self {
        Self {
            id: db.id,
            name: db.name,
            short_name: db.short_name,
            billing_account_id: db.billing_account_id,
            status: db.status,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}
