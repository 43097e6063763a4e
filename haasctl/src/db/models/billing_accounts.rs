//! Database models for billing accounts.

use crate::api::models::billing_accounts::BillingAccountCreate;
use crate::types::BillingAccountId;
use chrono::{DateTime, Utc};

/// Database request for creating a new billing account
#[derive(Debug, Clone)]
pub struct BillingAccountCreateDBRequest {
    pub name: String,
}

impl From<BillingAccountCreate> for BillingAccountCreateDBRequest {
    fn from(api: BillingAccountCreate) -> Self {
        Self {
            // Surrounding whitespace is never meaningful in a display name
            name: api.name.trim().to_string(),
        }
    }
}

/// Database response for a billing account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingAccountDBResponse {
    pub id: BillingAccountId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
