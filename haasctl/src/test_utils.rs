//! Test utilities (available with the `test-utils` feature).
//!
//! - [`MemoryStore`]: an in-memory [`ResourceStore`] that enforces the same uniqueness and
//!   reference rules as the PostgreSQL schema, counts calls and can be told to fail
//! - [`FakePlatform`]: an in-memory platform backend that records the commands it receives
//! - [`FakeConnector`] / [`FailingConnector`]: connectors for exercising route setup
//! - [`test_router`] / [`test_server`]: the full router wired to the fakes

use std::{
    collections::BTreeSet,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use async_trait::async_trait;
use axum::Router;
use axum_test::TestServer;
use chrono::Utc;
use tokio::time::Instant;
use uuid::Uuid;

use crate::api::models::apps::AppStatus;
use crate::config::Config;
use crate::db::{
    errors::{DbError, Result},
    handlers::{apps::AppFilter, billing_accounts::BillingAccountFilter, users::UserFilter},
    models::{
        apps::{AppCreateDBRequest, AppDBResponse},
        billing_accounts::{BillingAccountCreateDBRequest, BillingAccountDBResponse},
        users::{UserCreateDBRequest, UserDBResponse},
    },
    store::ResourceStore,
};
use crate::platform::{Platform, PlatformConnector, PlatformError, PlatformHandle};
use crate::types::{AppId, BillingAccountId, UserId};

pub fn create_test_config() -> Config {
    let mut config = Config::default();
    // The Prometheus recorder is process-global and can only be installed once
    config.enable_metrics = false;
    config
}

/// Router with the default test configuration, backed by the given fakes
pub async fn test_router(store: Arc<MemoryStore>, platform: Arc<FakePlatform>) -> Router {
    let config = create_test_config();
    let connector = FakeConnector::new(platform);
    let api = crate::setup_routes(store, &connector, &config)
        .await
        .expect("Fake connector never fails");
    crate::build_router(api, &config)
}

pub async fn test_server(store: Arc<MemoryStore>, platform: Arc<FakePlatform>) -> TestServer {
    TestServer::new(test_router(store, platform).await).expect("Failed to create test server")
}

#[derive(Default)]
struct Tables {
    users: Vec<UserDBResponse>,
    billing_accounts: Vec<BillingAccountDBResponse>,
    memberships: Vec<(BillingAccountId, UserId)>,
    apps: Vec<AppDBResponse>,
}

/// In-memory [`ResourceStore`] spy
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    calls: AtomicUsize,
    failure: Mutex<Option<String>>,
    fail_status_updates: AtomicBool,
}

fn unique_violation(table: &str, constraint: &str) -> DbError {
    DbError::UniqueViolation {
        constraint: Some(constraint.to_string()),
        table: Some(table.to_string()),
        message: format!("duplicate key value violates unique constraint \"{constraint}\""),
    }
}

fn foreign_key_violation(table: &str, constraint: &str) -> DbError {
    DbError::ForeignKeyViolation {
        constraint: Some(constraint.to_string()),
        table: Some(table.to_string()),
        message: format!("insert or update on table \"{table}\" violates foreign key constraint \"{constraint}\""),
    }
}

/// Newest first, like the SQL repositories
fn page<T: Clone>(rows: &[T], skip: i64, limit: i64) -> Vec<T> {
    rows.iter()
        .rev()
        .skip(skip.max(0) as usize)
        .take(limit.max(0) as usize)
        .cloned()
        .collect()
}

impl MemoryStore {
    /// Number of store calls made so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Make every following call fail with `message`
    pub fn fail_with(&self, message: &str) {
        *self.failure.lock().expect("lock poisoned") = Some(message.to_string());
    }

    /// Make `set_app_status` fail while everything else keeps working
    pub fn fail_status_updates(&self) {
        self.fail_status_updates.store(true, Ordering::SeqCst);
    }

    pub fn user_count(&self) -> usize {
        self.tables().users.len()
    }

    pub fn apps(&self) -> Vec<AppDBResponse> {
        self.tables().apps.clone()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().expect("lock poisoned")
    }

    /// Count the call and apply any injected failure
    fn enter(&self) -> Result<MutexGuard<'_, Tables>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.failure.lock().expect("lock poisoned").clone() {
            return Err(DbError::Other(anyhow::anyhow!(message)));
        }
        Ok(self.tables())
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn create_user(&self, request: &UserCreateDBRequest) -> Result<UserDBResponse> {
        let mut tables = self.enter()?;
        if tables.users.iter().any(|u| u.slack_user_id == request.slack_user_id) {
            return Err(unique_violation("users", "users_slack_user_id_key"));
        }

        let now = Utc::now();
        let user = UserDBResponse {
            id: Uuid::new_v4(),
            slack_user_id: request.slack_user_id.clone(),
            created_at: now,
            updated_at: now,
        };
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<UserDBResponse>> {
        Ok(self.enter()?.users.iter().find(|u| u.id == id).cloned())
    }

    async fn list_users(&self, filter: &UserFilter) -> Result<Vec<UserDBResponse>> {
        Ok(page(&self.enter()?.users, filter.skip, filter.limit))
    }

    async fn list_user_billing_accounts(&self, user_id: UserId) -> Result<Vec<BillingAccountDBResponse>> {
        let tables = self.enter()?;
        Ok(tables
            .memberships
            .iter()
            .filter(|(_, member)| *member == user_id)
            .filter_map(|(account_id, _)| tables.billing_accounts.iter().find(|a| a.id == *account_id))
            .cloned()
            .collect())
    }

    async fn create_billing_account(&self, request: &BillingAccountCreateDBRequest) -> Result<BillingAccountDBResponse> {
        let mut tables = self.enter()?;
        let now = Utc::now();
        let account = BillingAccountDBResponse {
            id: Uuid::new_v4(),
            name: request.name.clone(),
            created_at: now,
            updated_at: now,
        };
        tables.billing_accounts.push(account.clone());
        Ok(account)
    }

    async fn get_billing_account(&self, id: BillingAccountId) -> Result<Option<BillingAccountDBResponse>> {
        Ok(self.enter()?.billing_accounts.iter().find(|a| a.id == id).cloned())
    }

    async fn list_billing_accounts(&self, filter: &BillingAccountFilter) -> Result<Vec<BillingAccountDBResponse>> {
        Ok(page(&self.enter()?.billing_accounts, filter.skip, filter.limit))
    }

    async fn add_billing_account_user(&self, billing_account_id: BillingAccountId, user_id: UserId) -> Result<bool> {
        let mut tables = self.enter()?;
        if !tables.billing_accounts.iter().any(|a| a.id == billing_account_id) {
            return Err(foreign_key_violation(
                "billing_account_users",
                "billing_account_users_billing_account_id_fkey",
            ));
        }
        if !tables.users.iter().any(|u| u.id == user_id) {
            return Err(foreign_key_violation("billing_account_users", "billing_account_users_user_id_fkey"));
        }

        let membership = (billing_account_id, user_id);
        if tables.memberships.contains(&membership) {
            return Ok(false);
        }
        tables.memberships.push(membership);
        Ok(true)
    }

    async fn list_billing_account_users(&self, billing_account_id: BillingAccountId) -> Result<Vec<UserDBResponse>> {
        let tables = self.enter()?;
        Ok(tables
            .memberships
            .iter()
            .filter(|(account_id, _)| *account_id == billing_account_id)
            .filter_map(|(_, user_id)| tables.users.iter().find(|u| u.id == *user_id))
            .cloned()
            .collect())
    }

    async fn create_app(&self, request: &AppCreateDBRequest) -> Result<AppDBResponse> {
        let mut tables = self.enter()?;
        if tables.apps.iter().any(|a| a.short_name == request.short_name) {
            return Err(unique_violation("apps", "apps_short_name_key"));
        }
        if !tables.billing_accounts.iter().any(|a| a.id == request.billing_account_id) {
            return Err(foreign_key_violation("apps", "apps_billing_account_id_fkey"));
        }

        let now = Utc::now();
        let app = AppDBResponse {
            id: Uuid::new_v4(),
            name: request.name.clone(),
            short_name: request.short_name.clone(),
            billing_account_id: request.billing_account_id,
            status: AppStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        tables.apps.push(app.clone());
        Ok(app)
    }

    async fn get_app(&self, id: AppId) -> Result<Option<AppDBResponse>> {
        Ok(self.enter()?.apps.iter().find(|a| a.id == id).cloned())
    }

    async fn list_apps(&self, filter: &AppFilter) -> Result<Vec<AppDBResponse>> {
        let tables = self.enter()?;
        let matching: Vec<AppDBResponse> = tables
            .apps
            .iter()
            .filter(|a| filter.billing_account_id.is_none_or(|id| a.billing_account_id == id))
            .cloned()
            .collect();
        Ok(page(&matching, filter.skip, filter.limit))
    }

    async fn set_app_status(&self, id: AppId, status: AppStatus) -> Result<AppDBResponse> {
        let mut tables = self.enter()?;
        if self.fail_status_updates.load(Ordering::SeqCst) {
            return Err(DbError::Other(anyhow::anyhow!("status update rejected")));
        }

        let app = tables.apps.iter_mut().find(|a| a.id == id).ok_or(DbError::NotFound)?;
        app.status = status;
        app.updated_at = Utc::now();
        Ok(app.clone())
    }

    async fn delete_app(&self, id: AppId) -> Result<bool> {
        let mut tables = self.enter()?;
        let before = tables.apps.len();
        tables.apps.retain(|a| a.id != id);
        Ok(tables.apps.len() < before)
    }
}

type FailureFn = Box<dyn Fn() -> PlatformError + Send + Sync>;

/// In-memory platform backend.
///
/// Commands are recorded in the Dokku daemon's syntax so tests can assert on what would have
/// been sent.
#[derive(Default)]
pub struct FakePlatform {
    apps: Mutex<BTreeSet<String>>,
    commands: Mutex<Vec<String>>,
    failure: Mutex<Option<FailureFn>>,
}

impl FakePlatform {
    pub const VERSION: &'static str = "dokku version 0.35.0";

    /// Make every following call fail with the error `failure` builds
    pub fn fail_with(&self, failure: impl Fn() -> PlatformError + Send + Sync + 'static) {
        *self.failure.lock().expect("lock poisoned") = Some(Box::new(failure));
    }

    /// Undo [`FakePlatform::fail_with`]
    pub fn recover(&self) {
        *self.failure.lock().expect("lock poisoned") = None;
    }

    pub fn has_app(&self, name: &str) -> bool {
        self.apps.lock().expect("lock poisoned").contains(name)
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().expect("lock poisoned").clone()
    }

    fn record(&self, command: String) -> crate::platform::Result<MutexGuard<'_, BTreeSet<String>>> {
        self.commands.lock().expect("lock poisoned").push(command);
        if let Some(failure) = self.failure.lock().expect("lock poisoned").as_ref() {
            return Err(failure());
        }
        Ok(self.apps.lock().expect("lock poisoned"))
    }
}

#[async_trait]
impl Platform for FakePlatform {
    async fn version(&self, _deadline: Instant) -> crate::platform::Result<String> {
        self.record("version".to_string())?;
        Ok(Self::VERSION.to_string())
    }

    async fn create_app(&self, name: &str, _deadline: Instant) -> crate::platform::Result<()> {
        let command = format!("apps:create {name}");
        let mut apps = self.record(command.clone())?;
        if !apps.insert(name.to_string()) {
            return Err(PlatformError::CommandFailed {
                command,
                output: "Name is already taken".to_string(),
            });
        }
        Ok(())
    }

    async fn destroy_app(&self, name: &str, _deadline: Instant) -> crate::platform::Result<()> {
        let command = format!("apps:destroy {name} --force");
        let mut apps = self.record(command.clone())?;
        if !apps.remove(name) {
            return Err(PlatformError::CommandFailed {
                command,
                output: format!("App {name} does not exist"),
            });
        }
        Ok(())
    }

    async fn app_exists(&self, name: &str, _deadline: Instant) -> crate::platform::Result<bool> {
        Ok(self.record(format!("apps:exists {name}"))?.contains(name))
    }

    async fn list_apps(&self, _deadline: Instant) -> crate::platform::Result<Vec<String>> {
        Ok(self.record("apps:list".to_string())?.iter().cloned().collect())
    }

    fn is_connected(&self) -> bool {
        self.failure.lock().expect("lock poisoned").is_none()
    }
}

/// Connector handing out a shared [`FakePlatform`]
pub struct FakeConnector {
    platform: Arc<FakePlatform>,
    connects: AtomicUsize,
}

impl FakeConnector {
    pub fn new(platform: Arc<FakePlatform>) -> Self {
        Self {
            platform,
            connects: AtomicUsize::new(0),
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlatformConnector for FakeConnector {
    async fn connect(&self) -> crate::platform::Result<PlatformHandle> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let handle: PlatformHandle = self.platform.clone();
        Ok(handle)
    }
}

/// Connector whose backend is never reachable
#[derive(Default)]
pub struct FailingConnector {
    attempts: AtomicUsize,
}

impl FailingConnector {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlatformConnector for FailingConnector {
    async fn connect(&self) -> crate::platform::Result<PlatformHandle> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(PlatformError::Connect {
            address: "tcp://127.0.0.1:1".to_string(),
            reason: "Connection refused".to_string(),
        })
    }
}
