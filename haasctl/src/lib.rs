//! # haasctl: control plane for hack-as-a-service
//!
//! `haasctl` lets a group of users provision and manage hosted application instances ("apps")
//! on a shared platform, track the billing accounts that own them, and associate users with both.
//!
//! ## Architecture
//!
//! The service is an [Axum](https://github.com/tokio-rs/axum) HTTP API over PostgreSQL, talking
//! to a [Dokku](https://dokku.com) daemon that actually runs the apps.
//!
//! ### Request Flow
//!
//! At startup [`setup_routes`] opens exactly one connection to the platform through a
//! [`PlatformConnector`](platform::PlatformConnector). If that fails, startup fails and no
//! routes are registered. Every request then passes through a middleware that attaches a
//! [`RequestContext`](api::context::RequestContext) carrying the shared platform handle and the
//! request's deadline. Handlers decode the body strictly, call the
//! [`ResourceStore`](db::store::ResourceStore) and, for apps, the platform, and answer with a
//! `{"status": "ok", ...}` envelope. Failures become `{"status": "error", "message": ...}` with
//! a matching status code (see [`errors`]).
//!
//! ### Core Components
//!
//! The **platform layer** ([`platform`]) owns the daemon connection. Its socket carries one
//! exchange at a time, so the connection serializes calls internally; callers share it freely.
//!
//! The **database layer** ([`db`]) uses the repository pattern. Each entity (users, billing
//! accounts, apps) has a repository; [`PgStore`](db::store::PgStore) composes them behind the
//! `ResourceStore` trait that handlers depend on.
//!
//! The **API layer** ([`api`]) holds the handlers, request/response models, the envelope
//! helpers and the request context.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use haasctl::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = haasctl::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     haasctl::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//! }
//! ```
//!
//! ## Database Setup
//!
//! Migrations are embedded and run automatically by [`Application::new`]:
//!
//! ```no_run
//! # use sqlx::PgPool;
//! # async fn example(pool: PgPool) -> Result<(), sqlx::migrate::MigrateError> {
//! haasctl::migrator().run(&pool).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.
pub mod api;
pub mod config;
pub mod db;
pub mod errors;
mod openapi;
pub mod platform;
pub mod telemetry;
mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use crate::{
    api::context::{attach_request_context, ContextSource},
    api::handlers::{apps, billing_accounts, root, users},
    db::store::{PgStore, StoreHandle},
    platform::{dokku::DokkuConnector, PlatformConnector, PlatformError},
};
use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Json, Router,
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
pub use config::Config;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{debug, info, instrument, Level};
use utoipa_scalar::{Scalar, Servable};

pub use types::{AppId, BillingAccountId, UserId};

/// Application state shared across all request handlers.
///
/// The platform handle is deliberately not here: handlers receive it per request through
/// [`RequestContext`](api::context::RequestContext).
///
/// ```ignore
/// let state = AppState::builder().store(store).config(config).build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub store: StoreHandle,
    pub config: Config,
}

/// Get the haasctl database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Connect to the platform and build the resource API.
///
/// `connector` is called exactly once. If it fails the error is returned and no router is
/// built. Otherwise every route gets the resulting handle through its request context. The
/// routes are nested under `config.api_prefix`.
#[instrument(skip_all)]
pub async fn setup_routes(store: StoreHandle, connector: &dyn PlatformConnector, config: &Config) -> Result<Router, PlatformError> {
    let platform = connector.connect().await?;

    let state = AppState::builder().store(store).config(config.clone()).build();
    let context = ContextSource {
        platform,
        request_timeout: config.platform.request_timeout,
    };

    let routes = Router::new()
        .route("/", get(root::diagnostics))
        // Users
        .route("/users", get(users::list_users).post(users::create_user))
        .route("/users/{id}", get(users::get_user))
        .route("/users/{id}/billingAccounts", get(users::list_user_billing_accounts))
        // Billing accounts and memberships
        .route(
            "/billingAccounts",
            get(billing_accounts::list_billing_accounts).post(billing_accounts::create_billing_account),
        )
        .route("/billingAccounts/{id}", get(billing_accounts::get_billing_account))
        .route("/billingAccounts/{id}/users", get(billing_accounts::list_billing_account_users))
        .route(
            "/billingAccounts/{id}/users/{user_id}",
            post(billing_accounts::add_billing_account_user),
        )
        .route("/billingAccounts/{id}/apps", get(billing_accounts::list_billing_account_apps))
        // Apps
        .route("/apps", get(apps::list_apps).post(apps::create_app))
        .route("/apps/{id}", get(apps::get_app).delete(apps::delete_app))
        .layer(from_fn_with_state(context, attach_request_context))
        .with_state(state);

    debug!(prefix = %config.api_prefix, "Registered API routes");
    if config.api_prefix.is_empty() {
        Ok(routes)
    } else {
        Ok(Router::new().nest(&config.api_prefix, routes))
    }
}

/// Wrap the resource API with the service-level routes and layers
pub fn build_router(api: Router, config: &Config) -> Router {
    let doc = openapi::api_doc(&config.api_prefix);

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route(
            "/api-docs/openapi.json",
            get({
                let doc = doc.clone();
                move || std::future::ready(Json(doc.clone()))
            }),
        )
        .merge(Scalar::with_url("/docs", doc))
        .merge(api);

    // Add Prometheus metrics if enabled
    let router = if config.enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router
            .route("/internal/metrics", get(move || std::future::ready(metric_handle.render())))
            .layer(prometheus_layer)
    } else {
        router
    };

    router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    )
}

/// The assembled service.
///
/// 1. **Create**: [`Application::new`] connects the database, runs migrations and connects to
///    the platform
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and starts handling requests
/// 3. **Shutdown**: When the shutdown signal fires, in-flight requests finish, then the pool is
///    closed and telemetry flushed
pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting haasctl with configuration: {:#?}", config);
        config.validate()?;

        let pool = db::pools::connect(&config.database.url, &config.database.pool).await?;
        migrator().run(&pool).await?;
        info!("Database migrations applied");

        let store: StoreHandle = Arc::new(PgStore::new(pool.clone()));
        let connector = DokkuConnector::new(
            config.platform.address.clone(),
            config.platform.connect_timeout,
            config.platform.request_timeout,
        );
        let api = setup_routes(store, &connector, &config).await?;
        let router = build_router(api, &config);

        Ok(Self { router, config, pool })
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "haasctl listening on http://{}, API at {}",
            bind_addr,
            if self.config.api_prefix.is_empty() { "/" } else { &self.config.api_prefix }
        );

        // Run the server with graceful shutdown
        axum::serve(listener, self.router).with_graceful_shutdown(shutdown).await?;

        info!("Closing database connections...");
        self.pool.close().await;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_utils::{create_test_config, FailingConnector, FakeConnector, FakePlatform, MemoryStore};
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use serde_json::Value;

    #[tokio::test]
    #[test_log::test]
    async fn test_failing_connector_aborts_setup() {
        let connector = FailingConnector::default();

        let result = setup_routes(Arc::new(MemoryStore::default()), &connector, &create_test_config()).await;

        assert!(matches!(result, Err(PlatformError::Connect { .. })));
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test]
    #[test_log::test]
    async fn test_connection_is_shared_across_requests() {
        let platform = Arc::new(FakePlatform::default());
        let connector = FakeConnector::new(platform.clone());
        let config = create_test_config();
        let api = setup_routes(Arc::new(MemoryStore::default()), &connector, &config).await.unwrap();
        let server = TestServer::new(build_router(api, &config)).unwrap();

        for _ in 0..5 {
            server.get("/api").await.assert_status_ok();
        }

        assert_eq!(connector.connects(), 1);
        // version and apps:list per request
        assert_eq!(platform.commands().len(), 10);
    }

    #[tokio::test]
    #[test_log::test]
    async fn test_empty_prefix_serves_api_at_root() {
        let mut config = create_test_config();
        config.api_prefix = String::new();
        let connector = FakeConnector::new(Arc::new(FakePlatform::default()));
        let api = setup_routes(Arc::new(MemoryStore::default()), &connector, &config).await.unwrap();
        let server = TestServer::new(build_router(api, &config)).unwrap();

        server.get("/").await.assert_status_ok();
        server.get("/users").await.assert_status_ok();
        server.get("/api/users").await.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    #[test_log::test]
    async fn test_service_routes() {
        let server = crate::test_utils::test_server(Arc::new(MemoryStore::default()), Arc::new(FakePlatform::default())).await;

        let health = server.get("/healthz").await;
        health.assert_status_ok();
        assert_eq!(health.text(), "OK");

        let doc: Value = server.get("/api-docs/openapi.json").await.json();
        assert_eq!(doc["info"]["title"], "haasctl API");
        assert_eq!(doc["servers"][0]["url"], "/api");

        server.get("/docs").await.assert_status_ok();
        // Metrics are disabled in tests
        server.get("/internal/metrics").await.assert_status(StatusCode::NOT_FOUND);
    }

    /// Dokku daemon that answers every command successfully after `delay`
    async fn slow_daemon(delay: std::time::Duration) -> platform::PlatformAddress {
        use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (reader, mut writer) = stream.into_split();
            let mut lines = BufReader::new(reader).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tokio::time::sleep(delay).await;
                let output = if line == "apps:list" { "=====> My Apps" } else { "dokku version 0.35.0" };
                let reply = serde_json::json!({"ok": true, "output": output}).to_string();
                writer.write_all(format!("{reply}\n").as_bytes()).await.unwrap();
            }
        });
        platform::PlatformAddress::Tcp(addr.to_string())
    }

    #[tokio::test]
    #[test_log::test]
    async fn test_short_client_deadline_does_not_break_shared_connection() {
        let address = slow_daemon(std::time::Duration::from_millis(20)).await;
        let config = create_test_config();
        let connector = DokkuConnector::new(address, config.platform.connect_timeout, config.platform.request_timeout);
        let api = setup_routes(Arc::new(MemoryStore::default()), &connector, &config).await.unwrap();
        let server = TestServer::new(build_router(api, &config)).unwrap();

        server
            .get("/api")
            .add_header("X-Request-Timeout", "1ms")
            .await
            .assert_status(StatusCode::GATEWAY_TIMEOUT);

        let response = server.get("/api").await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["platform"], serde_json::json!({"version": "dokku version 0.35.0", "apps": 0}));
    }

    #[tokio::test]
    #[test_log::test]
    async fn test_request_timeout_header_is_validated() {
        let server = crate::test_utils::test_server(Arc::new(MemoryStore::default()), Arc::new(FakePlatform::default())).await;

        server
            .get("/api/users")
            .add_header("X-Request-Timeout", "5s")
            .await
            .assert_status_ok();

        let response = server.get("/api/users").add_header("X-Request-Timeout", "whenever").await;
        response.assert_status(StatusCode::BAD_REQUEST);
        response.assert_json(&serde_json::json!({"status": "error", "message": "Invalid X-Request-Timeout header"}));
    }
}
