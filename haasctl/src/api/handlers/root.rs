use crate::api::context::RequestContext;
use crate::api::envelope::STATUS_OK;
use crate::errors::Result;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct PlatformInfo {
    pub version: String,
    /// Number of app instances the platform currently hosts
    pub apps: usize,
}

/// Body of `GET /`
#[derive(Debug, Serialize, ToSchema)]
pub struct ServiceInfo {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub platform: PlatformInfo,
}

#[utoipa::path(
    get,
    path = "/",
    tag = "service",
    summary = "Service diagnostics",
    description = "Reports the service version and asks the platform for its own version and app count, proving the shared connection works.",
    responses(
        (status = 200, description = "Service and platform versions", body = ServiceInfo),
        (status = 502, description = "The platform answered with an error"),
        (status = 503, description = "The platform connection is lost"),
        (status = 504, description = "The platform did not answer in time"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn diagnostics(ctx: RequestContext) -> Result<Json<ServiceInfo>> {
    let platform_version = ctx.platform.version(ctx.deadline).await?;
    let platform_apps = ctx.platform.list_apps(ctx.deadline).await?;

    Ok(Json(ServiceInfo {
        status: STATUS_OK,
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        platform: PlatformInfo {
            version: platform_version,
            apps: platform_apps.len(),
        },
    }))
}
