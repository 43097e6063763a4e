//! Hosted app handlers.
//!
//! Creating an app touches two systems that cannot commit together: the store and the
//! platform. The store record is written first, as `pending`, and only moves to `active` once
//! the platform has created the instance, or to `failed` if it refused. A record that stays
//! `pending` means the outcome is unknown (the platform call timed out or the connection
//! dropped) or could not be recorded; such records are logged at `error` and have to be
//! reconciled against the platform's app list.

use crate::api::context::RequestContext;
use crate::api::envelope;
use crate::api::handlers::billing_accounts::require_billing_account;
use crate::api::models::{
    apps::{AppCreate, AppResponse, AppStatus},
    pagination::Pagination,
};
use crate::api::payload::{Path, Payload, Query};
use crate::db::{handlers::apps::AppFilter, models::apps::AppCreateDBRequest};
use crate::errors::{Error, Result};
use crate::types::abbrev_uuid;
use crate::{types::AppId, AppState};
use axum::{extract::State, Json};
use serde_json::Value;
use tracing::{error, info, warn};

fn app_not_found(id: AppId) -> Error {
    Error::NotFound {
        resource: "App".to_string(),
        id: id.to_string(),
    }
}

#[utoipa::path(
    post,
    path = "/apps",
    tag = "apps",
    summary = "Create app",
    description = "Records the app, then creates its instance on the platform. The returned record is `active`.",
    request_body = AppCreate,
    responses(
        (status = 200, description = "App created, returned under `app`", body = AppResponse),
        (status = 400, description = "Invalid JSON, blank name or invalid short name"),
        (status = 404, description = "Billing account not found"),
        (status = 500, description = "The store failed; if the platform already created the app the record is left `pending`"),
        (status = 502, description = "The platform refused the app (record marked `failed`) or its outcome is unknown (record left `pending`)"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_app(
    State(state): State<AppState>,
    ctx: RequestContext,
    Payload(create): Payload<AppCreate>,
) -> Result<Json<Value>> {
    create.validate().map_err(|message| Error::Validation { message })?;
    require_billing_account(state.store.as_ref(), create.billing_account_id).await?;

    let record = state.store.create_app(&AppCreateDBRequest::from(create)).await?;
    let app_id = abbrev_uuid(&record.id);

    if let Err(platform_err) = ctx.platform.create_app(&record.short_name, ctx.deadline).await {
        if platform_err.is_refusal() {
            warn!(%app_id, short_name = %record.short_name, error = %platform_err, "Platform refused app");
            if let Err(e) = state.store.set_app_status(record.id, AppStatus::Failed).await {
                error!(%app_id, short_name = %record.short_name, error = %e, "Could not mark app failed, record left pending");
            }
        } else {
            error!(%app_id, short_name = %record.short_name, error = %platform_err, "Platform outcome unknown, record left pending");
        }
        return Err(Error::PartialProvisioning {
            short_name: record.short_name,
            reason: platform_err.to_string(),
            platform_failed: true,
        });
    }

    match state.store.set_app_status(record.id, AppStatus::Active).await {
        Ok(app) => {
            info!(%app_id, short_name = %app.short_name, "App provisioned");
            envelope::ok("app", AppResponse::from(app))
        }
        Err(e) => {
            error!(%app_id, short_name = %record.short_name, error = %e, "App exists on platform but record left pending");
            Err(Error::PartialProvisioning {
                short_name: record.short_name,
                reason: format!("created on the platform but the record could not be updated: {e}"),
                platform_failed: false,
            })
        }
    }
}

#[utoipa::path(
    get,
    path = "/apps",
    tag = "apps",
    summary = "List apps",
    params(Pagination),
    responses(
        (status = 200, description = "Apps, returned under `apps`", body = Vec<AppResponse>),
        (status = 500, description = "Internal server error"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_apps(State(state): State<AppState>, Query(pagination): Query<Pagination>) -> Result<Json<Value>> {
    let (skip, limit) = pagination.params();
    let apps = state.store.list_apps(&AppFilter::new(skip, limit)).await?;

    envelope::ok("apps", apps.into_iter().map(AppResponse::from).collect::<Vec<_>>())
}

#[utoipa::path(
    get,
    path = "/apps/{id}",
    tag = "apps",
    summary = "Get app",
    params(("id" = uuid::Uuid, Path, description = "App ID")),
    responses(
        (status = 200, description = "The app, returned under `app`", body = AppResponse),
        (status = 404, description = "App not found"),
        (status = 500, description = "Internal server error"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_app(State(state): State<AppState>, Path(id): Path<AppId>) -> Result<Json<Value>> {
    let app = state.store.get_app(id).await?.ok_or_else(|| app_not_found(id))?;
    envelope::ok("app", AppResponse::from(app))
}

#[utoipa::path(
    delete,
    path = "/apps/{id}",
    tag = "apps",
    summary = "Delete app",
    description = "Destroys the app's platform instance, if there is one, then deletes the record.",
    params(("id" = uuid::Uuid, Path, description = "App ID")),
    responses(
        (status = 200, description = "The deleted app, returned under `app`", body = AppResponse),
        (status = 404, description = "App not found"),
        (status = 500, description = "Internal server error"),
        (status = 502, description = "The platform could not destroy the app; the record is kept"),
        (status = 503, description = "The platform connection is lost"),
        (status = 504, description = "The platform did not answer in time"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn delete_app(State(state): State<AppState>, ctx: RequestContext, Path(id): Path<AppId>) -> Result<Json<Value>> {
    let app = state.store.get_app(id).await?.ok_or_else(|| app_not_found(id))?;

    // Records of apps the platform never created (or already lost) are deleted directly
    if ctx.platform.app_exists(&app.short_name, ctx.deadline).await? {
        ctx.platform.destroy_app(&app.short_name, ctx.deadline).await?;
    }

    if !state.store.delete_app(id).await? {
        return Err(app_not_found(id));
    }

    info!(app_id = %abbrev_uuid(&id), short_name = %app.short_name, "App deleted");
    envelope::ok("app", AppResponse::from(app))
}
