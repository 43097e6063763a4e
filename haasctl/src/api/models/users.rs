//! API request/response models for users.

use crate::db::models::users::UserDBResponse;
use crate::types::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Body of `POST /users`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UserCreate {
    /// Slack member ID of the person this user represents
    #[serde(rename = "SlackUserID")]
    pub slack_user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub struct UserResponse {
    #[serde(rename = "ID")]
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    #[serde(rename = "SlackUserID")]
    pub slack_user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserDBResponse> for UserResponse {
    fn from(db: UserDBResponse) -> Self {
        Self {
            id: db.id,
            slack_user_id: db.slack_user_id,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}
