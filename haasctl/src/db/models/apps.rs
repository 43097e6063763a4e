//! Database models for hosted apps.

use crate::api::models::apps::{AppCreate, AppStatus};
use crate::types::{AppId, BillingAccountId};
use chrono::{DateTime, Utc};

/// Database request for creating a new app record.
///
/// Records are always inserted as [`AppStatus::Pending`]; the status only moves on once the
/// platform has answered.
#[derive(Debug, Clone)]
pub struct AppCreateDBRequest {
    pub name: String,
    pub short_name: String,
    pub billing_account_id: BillingAccountId,
}

impl From<AppCreate> for AppCreateDBRequest {
    fn from(api: AppCreate) -> Self {
        Self {
            name: api.name.trim().to_string(),
            short_name: api.short_name,
            billing_account_id: api.billing_account_id,
        }
    }
}

/// Database response for an app
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppDBResponse {
    pub id: AppId,
    pub name: String,
    pub short_name: String,
    pub billing_account_id: BillingAccountId,
    pub status: AppStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
