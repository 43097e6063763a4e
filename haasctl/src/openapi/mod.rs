//! OpenAPI documentation for the resource API.
//!
//! The document is served as JSON at `/api-docs/openapi.json` and rendered with Scalar at
//! `/docs`. Paths are documented relative to the configured API prefix, which is published
//! as the document's server URL.

mod extra_types;

use utoipa::{
    openapi::{self, Server},
    OpenApi,
};

use crate::api;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "haasctl API",
        description = "Hack-as-a-service control plane: users, billing accounts and hosted apps.\n\n\
            Every response is an envelope: `{\"status\": \"ok\", <key>: <payload>}` on success, \
            `{\"status\": \"error\", \"message\": ...}` on failure."
    ),
    paths(
        api::handlers::root::diagnostics,
        api::handlers::users::create_user,
        api::handlers::users::list_users,
        api::handlers::users::get_user,
        api::handlers::users::list_user_billing_accounts,
        api::handlers::billing_accounts::create_billing_account,
        api::handlers::billing_accounts::list_billing_accounts,
        api::handlers::billing_accounts::get_billing_account,
        api::handlers::billing_accounts::add_billing_account_user,
        api::handlers::billing_accounts::list_billing_account_users,
        api::handlers::billing_accounts::list_billing_account_apps,
        api::handlers::apps::create_app,
        api::handlers::apps::list_apps,
        api::handlers::apps::get_app,
        api::handlers::apps::delete_app,
    ),
    components(schemas(
        api::models::users::UserCreate,
        api::models::users::UserResponse,
        api::models::billing_accounts::BillingAccountCreate,
        api::models::billing_accounts::BillingAccountResponse,
        api::models::apps::AppCreate,
        api::models::apps::AppResponse,
        api::models::apps::AppStatus,
        api::handlers::root::ServiceInfo,
        api::handlers::root::PlatformInfo,
        extra_types::ErrorEnvelope,
    )),
    tags(
        (name = "service", description = "Service diagnostics"),
        (name = "users", description = "Users, identified by their Slack member ID"),
        (name = "billing_accounts", description = "Billing accounts and their members"),
        (name = "apps", description = "Apps hosted on the platform"),
    )
)]
pub struct ApiDoc;

/// The API document with `api_prefix` as its server URL
pub fn api_doc(api_prefix: &str) -> openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    let url = if api_prefix.is_empty() { "/" } else { api_prefix };
    doc.servers = Some(vec![Server::new(url)]);
    doc
}
