//! API request/response models for billing accounts.

use crate::db::models::billing_accounts::BillingAccountDBResponse;
use crate::types::BillingAccountId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Body of `POST /billingAccounts`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct BillingAccountCreate {
    /// Display name, must not be blank
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub struct BillingAccountResponse {
    #[serde(rename = "ID")]
    #[schema(value_type = String, format = "uuid")]
    pub id: BillingAccountId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<BillingAccountDBResponse> for BillingAccountResponse {
    fn from(db: BillingAccountDBResponse) -> Self {
        Self {
            id: db.id,
            name: db.name,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}
