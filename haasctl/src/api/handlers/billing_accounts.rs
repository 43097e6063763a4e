use crate::api::envelope;
use crate::api::models::{
    apps::AppResponse,
    billing_accounts::{BillingAccountCreate, BillingAccountResponse},
    pagination::Pagination,
    users::UserResponse,
};
use crate::api::payload::{Path, Payload, Query};
use crate::db::{
    handlers::{apps::AppFilter, billing_accounts::BillingAccountFilter},
    models::billing_accounts::{BillingAccountCreateDBRequest, BillingAccountDBResponse},
    store::ResourceStore,
};
use crate::errors::{Error, Result};
use crate::{
    types::{BillingAccountId, UserId},
    AppState,
};
use axum::{extract::State, Json};
use serde_json::Value;

pub(crate) async fn require_billing_account(store: &dyn ResourceStore, id: BillingAccountId) -> Result<BillingAccountDBResponse> {
    store.get_billing_account(id).await?.ok_or_else(|| Error::NotFound {
        resource: "Billing account".to_string(),
        id: id.to_string(),
    })
}

#[utoipa::path(
    post,
    path = "/billingAccounts",
    tag = "billing_accounts",
    summary = "Create billing account",
    request_body = BillingAccountCreate,
    responses(
        (status = 200, description = "Billing account created, returned under `billingAccount`", body = BillingAccountResponse),
        (status = 400, description = "Invalid JSON or blank name"),
        (status = 500, description = "The store rejected the billing account"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_billing_account(
    State(state): State<AppState>,
    Payload(create): Payload<BillingAccountCreate>,
) -> Result<Json<Value>> {
    if create.name.trim().is_empty() {
        return Err(Error::Validation {
            message: "Name must not be empty".to_string(),
        });
    }

    let account = state
        .store
        .create_billing_account(&BillingAccountCreateDBRequest::from(create))
        .await?;

    envelope::ok("billingAccount", BillingAccountResponse::from(account))
}

#[utoipa::path(
    get,
    path = "/billingAccounts",
    tag = "billing_accounts",
    summary = "List billing accounts",
    params(Pagination),
    responses(
        (status = 200, description = "Billing accounts, returned under `billingAccounts`", body = Vec<BillingAccountResponse>),
        (status = 500, description = "Internal server error"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_billing_accounts(State(state): State<AppState>, Query(pagination): Query<Pagination>) -> Result<Json<Value>> {
    let (skip, limit) = pagination.params();
    let accounts = state.store.list_billing_accounts(&BillingAccountFilter::new(skip, limit)).await?;

    envelope::ok(
        "billingAccounts",
        accounts.into_iter().map(BillingAccountResponse::from).collect::<Vec<_>>(),
    )
}

#[utoipa::path(
    get,
    path = "/billingAccounts/{id}",
    tag = "billing_accounts",
    summary = "Get billing account",
    params(("id" = uuid::Uuid, Path, description = "Billing account ID")),
    responses(
        (status = 200, description = "The billing account, returned under `billingAccount`", body = BillingAccountResponse),
        (status = 404, description = "Billing account not found"),
        (status = 500, description = "Internal server error"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_billing_account(State(state): State<AppState>, Path(id): Path<BillingAccountId>) -> Result<Json<Value>> {
    let account = require_billing_account(state.store.as_ref(), id).await?;
    envelope::ok("billingAccount", BillingAccountResponse::from(account))
}

#[utoipa::path(
    post,
    path = "/billingAccounts/{id}/users/{user_id}",
    tag = "billing_accounts",
    summary = "Add a user to a billing account",
    description = "Adding a user who is already a member succeeds without changing anything.",
    params(
        ("id" = uuid::Uuid, Path, description = "Billing account ID"),
        ("user_id" = uuid::Uuid, Path, description = "User ID"),
    ),
    responses(
        (status = 200, description = "Current members, returned under `users`", body = Vec<UserResponse>),
        (status = 404, description = "Billing account or user not found"),
        (status = 500, description = "Internal server error"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn add_billing_account_user(
    State(state): State<AppState>,
    Path((id, user_id)): Path<(BillingAccountId, UserId)>,
) -> Result<Json<Value>> {
    require_billing_account(state.store.as_ref(), id).await?;
    if state.store.get_user(user_id).await?.is_none() {
        return Err(Error::NotFound {
            resource: "User".to_string(),
            id: user_id.to_string(),
        });
    }

    if !state.store.add_billing_account_user(id, user_id).await? {
        tracing::debug!(%id, %user_id, "User already belongs to billing account");
    }

    let members = state.store.list_billing_account_users(id).await?;
    envelope::ok("users", members.into_iter().map(UserResponse::from).collect::<Vec<_>>())
}

#[utoipa::path(
    get,
    path = "/billingAccounts/{id}/users",
    tag = "billing_accounts",
    summary = "List billing account members",
    params(("id" = uuid::Uuid, Path, description = "Billing account ID")),
    responses(
        (status = 200, description = "Members, returned under `users`", body = Vec<UserResponse>),
        (status = 404, description = "Billing account not found"),
        (status = 500, description = "Internal server error"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_billing_account_users(State(state): State<AppState>, Path(id): Path<BillingAccountId>) -> Result<Json<Value>> {
    require_billing_account(state.store.as_ref(), id).await?;

    let members = state.store.list_billing_account_users(id).await?;
    envelope::ok("users", members.into_iter().map(UserResponse::from).collect::<Vec<_>>())
}

#[utoipa::path(
    get,
    path = "/billingAccounts/{id}/apps",
    tag = "billing_accounts",
    summary = "List apps owned by a billing account",
    params(("id" = uuid::Uuid, Path, description = "Billing account ID"), Pagination),
    responses(
        (status = 200, description = "Apps, returned under `apps`", body = Vec<AppResponse>),
        (status = 404, description = "Billing account not found"),
        (status = 500, description = "Internal server error"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_billing_account_apps(
    State(state): State<AppState>,
    Path(id): Path<BillingAccountId>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Value>> {
    require_billing_account(state.store.as_ref(), id).await?;

    let (skip, limit) = pagination.params();
    let apps = state
        .store
        .list_apps(&AppFilter::new(skip, limit).with_billing_account(id))
        .await?;
    envelope::ok("apps", apps.into_iter().map(AppResponse::from).collect::<Vec<_>>())
}

#[cfg(test)]
mod tests {
    use crate::test_utils::{test_server, FakePlatform, MemoryStore};
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use serde_json::{json, Value};
    use std::sync::Arc;

    async fn create(server: &TestServer, path: &str, body: Value, key: &str) -> String {
        let response = server.post(path).json(&body).await;
        response.assert_status_ok();
        response.json::<Value>()[key]["ID"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    #[test_log::test]
    async fn test_create_billing_account() {
        let server = test_server(Arc::new(MemoryStore::default()), Arc::new(FakePlatform::default())).await;

        let response = server.post("/api/billingAccounts").json(&json!({"Name": "  Hack Club  "})).await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["billingAccount"]["Name"], "Hack Club");
    }

    #[tokio::test]
    #[test_log::test]
    async fn test_blank_name_is_rejected_before_store() {
        let store = Arc::new(MemoryStore::default());
        let server = test_server(store.clone(), Arc::new(FakePlatform::default())).await;

        let response = server.post("/api/billingAccounts").json(&json!({"Name": "   "})).await;

        response.assert_status(StatusCode::BAD_REQUEST);
        response.assert_json(&json!({"status": "error", "message": "Name must not be empty"}));
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    #[test_log::test]
    async fn test_membership_flow() {
        let server = test_server(Arc::new(MemoryStore::default()), Arc::new(FakePlatform::default())).await;
        let account = create(&server, "/api/billingAccounts", json!({"Name": "Team"}), "billingAccount").await;
        let user = create(&server, "/api/users", json!({"SlackUserID": "UMEM"}), "user").await;

        let path = format!("/api/billingAccounts/{account}/users/{user}");
        let first: Value = server.post(&path).await.json();
        // Adding twice is a no-op
        let second: Value = server.post(&path).await.json();
        assert_eq!(first, second);
        assert_eq!(first["users"].as_array().unwrap().len(), 1);
        assert_eq!(first["users"][0]["ID"], user.as_str());

        let members: Value = server.get(&format!("/api/billingAccounts/{account}/users")).await.json();
        assert_eq!(members["users"], first["users"]);

        let accounts: Value = server.get(&format!("/api/users/{user}/billingAccounts")).await.json();
        assert_eq!(accounts["billingAccounts"][0]["ID"], account.as_str());
    }

    #[tokio::test]
    #[test_log::test]
    async fn test_membership_requires_both_sides() {
        let server = test_server(Arc::new(MemoryStore::default()), Arc::new(FakePlatform::default())).await;
        let account = create(&server, "/api/billingAccounts", json!({"Name": "Team"}), "billingAccount").await;
        let missing = uuid::Uuid::new_v4();

        let response = server.post(&format!("/api/billingAccounts/{account}/users/{missing}")).await;
        response.assert_status(StatusCode::NOT_FOUND);
        response.assert_json(&json!({"status": "error", "message": format!("User with ID {missing} not found")}));

        let response = server.post(&format!("/api/billingAccounts/{missing}/users/{missing}")).await;
        response.assert_status(StatusCode::NOT_FOUND);
        response.assert_json(&json!({"status": "error", "message": format!("Billing account with ID {missing} not found")}));
    }

    #[tokio::test]
    #[test_log::test]
    async fn test_get_and_list_billing_accounts() {
        let server = test_server(Arc::new(MemoryStore::default()), Arc::new(FakePlatform::default())).await;
        let id = create(&server, "/api/billingAccounts", json!({"Name": "One"}), "billingAccount").await;
        create(&server, "/api/billingAccounts", json!({"Name": "Two"}), "billingAccount").await;

        let fetched: Value = server.get(&format!("/api/billingAccounts/{id}")).await.json();
        assert_eq!(fetched["billingAccount"]["Name"], "One");

        let listed: Value = server.get("/api/billingAccounts").await.json();
        assert_eq!(listed["billingAccounts"].as_array().unwrap().len(), 2);

        let apps: Value = server.get(&format!("/api/billingAccounts/{id}/apps")).await.json();
        assert_eq!(apps, json!({"status": "ok", "apps": []}));

        server
            .get(&format!("/api/billingAccounts/{}", uuid::Uuid::new_v4()))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }
}
