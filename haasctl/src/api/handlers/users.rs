use crate::api::envelope;
use crate::api::models::{
    billing_accounts::BillingAccountResponse,
    pagination::Pagination,
    users::{UserCreate, UserResponse},
};
use crate::api::payload::{Path, Payload, Query};
use crate::db::{handlers::users::UserFilter, models::users::UserCreateDBRequest};
use crate::errors::{Error, Result};
use crate::{types::UserId, AppState};
use axum::{extract::State, Json};
use serde_json::Value;

#[utoipa::path(
    post,
    path = "/users",
    tag = "users",
    summary = "Create user",
    request_body = UserCreate,
    responses(
        (status = 200, description = "User created, returned under `user`", body = UserResponse),
        (status = 400, description = "Body is not a valid user creation request"),
        (status = 500, description = "The store rejected the user"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_user(State(state): State<AppState>, Payload(create): Payload<UserCreate>) -> Result<Json<Value>> {
    let request = UserCreateDBRequest::from(create);
    let user = state.store.create_user(&request).await?;

    envelope::ok("user", UserResponse::from(user))
}

#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    summary = "List users",
    params(Pagination),
    responses(
        (status = 200, description = "Users, returned under `users`", body = Vec<UserResponse>),
        (status = 500, description = "Internal server error"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_users(State(state): State<AppState>, Query(pagination): Query<Pagination>) -> Result<Json<Value>> {
    let (skip, limit) = pagination.params();
    let users = state.store.list_users(&UserFilter::new(skip, limit)).await?;

    envelope::ok("users", users.into_iter().map(UserResponse::from).collect::<Vec<_>>())
}

#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "users",
    summary = "Get user",
    params(("id" = uuid::Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "The user, returned under `user`", body = UserResponse),
        (status = 404, description = "User not found"),
        (status = 500, description = "Internal server error"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_user(State(state): State<AppState>, Path(id): Path<UserId>) -> Result<Json<Value>> {
    let user = state.store.get_user(id).await?.ok_or_else(|| Error::NotFound {
        resource: "User".to_string(),
        id: id.to_string(),
    })?;

    envelope::ok("user", UserResponse::from(user))
}

#[utoipa::path(
    get,
    path = "/users/{id}/billingAccounts",
    tag = "users",
    summary = "List the billing accounts a user belongs to",
    params(("id" = uuid::Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Billing accounts, returned under `billingAccounts`", body = Vec<BillingAccountResponse>),
        (status = 404, description = "User not found"),
        (status = 500, description = "Internal server error"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_user_billing_accounts(State(state): State<AppState>, Path(id): Path<UserId>) -> Result<Json<Value>> {
    if state.store.get_user(id).await?.is_none() {
        return Err(Error::NotFound {
            resource: "User".to_string(),
            id: id.to_string(),
        });
    }

    let accounts = state.store.list_user_billing_accounts(id).await?;
    envelope::ok(
        "billingAccounts",
        accounts.into_iter().map(BillingAccountResponse::from).collect::<Vec<_>>(),
    )
}

#[cfg(test)]
mod tests {
    use crate::test_utils::{test_router, test_server, FakePlatform, MemoryStore};
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        Router,
    };
    use serde_json::{json, Value};
    use std::{collections::HashSet, sync::Arc};
    use tower::ServiceExt;

    #[tokio::test]
    #[test_log::test]
    async fn test_create_user() {
        let store = Arc::new(MemoryStore::default());
        let server = test_server(store.clone(), Arc::new(FakePlatform::default())).await;

        let response = server.post("/api/users").json(&json!({"SlackUserID": "U123"})).await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["user"]["SlackUserID"], "U123");
        assert!(body["user"]["ID"].as_str().is_some_and(|id| uuid::Uuid::parse_str(id).is_ok()));
        assert_eq!(store.user_count(), 1);
    }

    #[tokio::test]
    #[test_log::test]
    async fn test_create_user_rejects_non_json() {
        let store = Arc::new(MemoryStore::default());
        let server = test_server(store.clone(), Arc::new(FakePlatform::default())).await;

        let response = server.post("/api/users").text("not json").await;

        response.assert_status(StatusCode::BAD_REQUEST);
        response.assert_json(&json!({"status": "error", "message": "Invalid JSON"}));
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    #[test_log::test]
    async fn test_create_user_rejects_malformed_bodies_without_store_calls() {
        let store = Arc::new(MemoryStore::default());
        let server = test_server(store.clone(), Arc::new(FakePlatform::default())).await;

        for body in [
            json!({}),
            json!({"SlackUserID": 42}),
            json!({"SlackUserID": "U1", "Extra": true}),
            json!(["U1"]),
        ] {
            let response = server.post("/api/users").json(&body).await;
            response.assert_status(StatusCode::BAD_REQUEST);
            response.assert_json(&json!({"status": "error", "message": "Invalid JSON"}));
        }
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    #[test_log::test]
    async fn test_create_user_ignores_content_type() {
        let server = test_server(Arc::new(MemoryStore::default()), Arc::new(FakePlatform::default())).await;

        let response = server.post("/api/users").text(r#"{"SlackUserID":"U9"}"#).await;

        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["user"]["SlackUserID"], "U9");
    }

    #[tokio::test]
    #[test_log::test]
    async fn test_store_failure_is_500_with_store_message() {
        let store = Arc::new(MemoryStore::default());
        store.fail_with("connection to store refused");
        let server = test_server(store.clone(), Arc::new(FakePlatform::default())).await;

        let response = server.post("/api/users").json(&json!({"SlackUserID": "U123"})).await;

        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        response.assert_json(&json!({"status": "error", "message": "connection to store refused"}));
    }

    #[tokio::test]
    #[test_log::test]
    async fn test_duplicate_slack_user_id_is_store_error() {
        let server = test_server(Arc::new(MemoryStore::default()), Arc::new(FakePlatform::default())).await;

        server.post("/api/users").json(&json!({"SlackUserID": "UDUP"})).await.assert_status_ok();
        let response = server.post("/api/users").json(&json!({"SlackUserID": "UDUP"})).await;

        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = response.json();
        assert_eq!(body["status"], "error");
        assert!(body["message"].as_str().unwrap().starts_with("Unique constraint violation"));
    }

    async fn post_user(router: Router, slack_user_id: String) -> (StatusCode, Value) {
        let request = Request::post("/api/users")
            .body(Body::from(json!({"SlackUserID": slack_user_id}).to_string()))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[test_log::test]
    async fn test_concurrent_distinct_creates() {
        let store = Arc::new(MemoryStore::default());
        let router = test_router(store.clone(), Arc::new(FakePlatform::default())).await;

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..25 {
            tasks.spawn(post_user(router.clone(), format!("U{i}")));
        }

        let mut ids = HashSet::new();
        while let Some(result) = tasks.join_next().await {
            let (status, body) = result.unwrap();
            assert_eq!(status, StatusCode::OK);
            assert!(ids.insert(body["user"]["ID"].as_str().unwrap().to_string()), "duplicate ID handed out");
        }
        assert_eq!(ids.len(), 25);
        assert_eq!(store.user_count(), 25);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[test_log::test]
    async fn test_concurrent_same_slack_user_id_succeeds_once() {
        let store = Arc::new(MemoryStore::default());
        let router = test_router(store.clone(), Arc::new(FakePlatform::default())).await;

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..2 {
            tasks.spawn(post_user(router.clone(), "USAME".to_string()));
        }

        let mut statuses = Vec::new();
        while let Some(result) = tasks.join_next().await {
            statuses.push(result.unwrap().0);
        }
        statuses.sort();
        assert_eq!(statuses, vec![StatusCode::OK, StatusCode::INTERNAL_SERVER_ERROR]);
        assert_eq!(store.user_count(), 1);
    }

    #[tokio::test]
    #[test_log::test]
    async fn test_get_and_list_users() {
        let server = test_server(Arc::new(MemoryStore::default()), Arc::new(FakePlatform::default())).await;

        let created: Value = server.post("/api/users").json(&json!({"SlackUserID": "UA"})).await.json();
        server.post("/api/users").json(&json!({"SlackUserID": "UB"})).await.assert_status_ok();
        let id = created["user"]["ID"].as_str().unwrap();

        let fetched: Value = server.get(&format!("/api/users/{id}")).await.json();
        assert_eq!(fetched["user"], created["user"]);

        let listed: Value = server.get("/api/users").await.json();
        assert_eq!(listed["status"], "ok");
        assert_eq!(listed["users"].as_array().unwrap().len(), 2);

        let page: Value = server.get("/api/users?limit=1&skip=1").await.json();
        assert_eq!(page["users"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    #[test_log::test]
    async fn test_malformed_path_and_query_get_error_envelope() {
        let store = Arc::new(MemoryStore::default());
        let server = test_server(store.clone(), Arc::new(FakePlatform::default())).await;

        let response = server.get("/api/users/not-a-uuid").await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["status"], "error");
        assert!(body["message"].as_str().unwrap().contains("not-a-uuid"));

        let response = server.get("/api/users?limit=abc").await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["status"], "error");
        assert!(body["message"].as_str().unwrap().contains("limit"));

        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    #[test_log::test]
    async fn test_get_missing_user_is_404() {
        let server = test_server(Arc::new(MemoryStore::default()), Arc::new(FakePlatform::default())).await;
        let id = uuid::Uuid::new_v4();

        let response = server.get(&format!("/api/users/{id}")).await;

        response.assert_status(StatusCode::NOT_FOUND);
        response.assert_json(&json!({"status": "error", "message": format!("User with ID {id} not found")}));

        server
            .get(&format!("/api/users/{id}/billingAccounts"))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }
}
