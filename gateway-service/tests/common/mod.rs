//! Shared setup for the gateway integration tests.
//!
//! Every test gets its own in-memory store, a recording mailer and a router
//! built exactly as `main` builds it, minus Postgres and SMTP.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use gateway_service::{
    build_router,
    config::{
        AdmissionConfig, DatabaseConfig, Environment, GatewayConfig, InviteConfig, JwtConfig,
        SecurityConfig, SmtpConfig,
    },
    db::{MemoryStore, Store, StoreError, UnitOfWork},
    models::{Account, AccountKind, AccountPatch, Invite, InvitePatch, Organization, PermissionModel},
    services::RecordingMailer,
    utils::{hash_password, Password},
    AppState,
};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tower::util::ServiceExt;
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str = "integration-test-secret";
pub const TEST_ADMIN_API_KEY: &str = "test-admin-key-12345";
pub const TEST_PASSWORD: &str = "correct horse battery";

pub fn test_config() -> GatewayConfig {
    GatewayConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "gateway-service".into(),
        service_version: "test".into(),
        log_level: "error".into(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: "postgres://unused".into(),
            max_connections: 1,
            min_connections: 1,
        },
        jwt: JwtConfig {
            secret: TEST_JWT_SECRET.into(),
            token_ttl_hours: 24,
        },
        invite: InviteConfig {
            ttl_hours: 24,
            hash_key: "integration-invite-key".into(),
        },
        // Generous limits so flow tests are not throttled; admission tests
        // override these.
        admission: AdmissionConfig {
            gate_timeout_ms: 2000,
            rate_per_second: 1000,
            rate_burst: 1000,
            registry_capacity: 1000,
        },
        smtp: SmtpConfig {
            host: "localhost".into(),
            port: 1025,
            user: String::new(),
            password: String::new(),
            from: "no-reply@localhost".into(),
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".into()],
            admin_api_key: TEST_ADMIN_API_KEY.into(),
        },
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<RecordingMailer>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> TestAppBuilder {
        TestAppBuilder {
            config: test_config(),
            permissions: PermissionModel::standard(),
            wrap: None,
        }
    }

    /// Sends a request and returns the status plus the decoded JSON body
    /// (`Value::Null` for an empty or non-JSON body).
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let response = self.send_raw(method, uri, token, body).await;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    pub async fn send_raw(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Inserts an already active account straight into the store and
    /// returns it with a session token.
    pub async fn seed_super_admin(&self, email: &str) -> (Account, String) {
        let hash = hash_password(&Password::new(TEST_PASSWORD.into())).unwrap();
        let account = Account::super_admin("Root".into(), email.into(), hash);
        self.store.insert_account(&account).await.unwrap();
        let token = self.state.jwt.issue(&account).unwrap().token;
        (account, token)
    }

    pub async fn seed_admin(&self, email: &str, created_by: Uuid) -> (Account, String) {
        let hash = hash_password(&Password::new(TEST_PASSWORD.into())).unwrap();
        let mut account = Account::pending_admin("Admin".into(), email.into(), created_by);
        account.apply(&AccountPatch::activated(hash));
        self.store.insert_account(&account).await.unwrap();
        let token = self.state.jwt.issue(&account).unwrap().token;
        (account, token)
    }

    pub async fn seed_organization(&self, admin_id: Uuid, email: &str) -> Organization {
        let organization = Organization::new("Acme".into(), email.into(), None, None, admin_id);
        self.store.insert_organization(&organization).await.unwrap();
        organization
    }

    /// Waits for the `nth` (1-based) invite mailed to `email` and returns
    /// its plaintext secret. Dispatch runs on a spawned task.
    pub async fn invite_secret(&self, email: &str, nth: usize) -> String {
        for _ in 0..200 {
            let secrets: Vec<String> = self
                .mailer
                .messages()
                .into_iter()
                .filter(|m| m.to == email)
                .map(|m| m.secret.expose().to_string())
                .collect();
            if secrets.len() >= nth {
                return secrets[nth - 1].clone();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("invite #{} for {} was never sent", nth, email);
    }
}

pub struct TestAppBuilder {
    config: GatewayConfig,
    permissions: PermissionModel,
    wrap: Option<Box<dyn FnOnce(Arc<MemoryStore>) -> Arc<dyn Store>>>,
}

impl TestAppBuilder {
    pub fn admission(mut self, admission: AdmissionConfig) -> Self {
        self.config.admission = admission;
        self
    }

    pub fn permissions(mut self, permissions: PermissionModel) -> Self {
        self.permissions = permissions;
        self
    }

    /// Serve through a wrapper around the memory store.
    pub fn store(mut self, wrap: impl FnOnce(Arc<MemoryStore>) -> Arc<dyn Store> + 'static) -> Self {
        self.wrap = Some(Box::new(wrap));
        self
    }

    pub fn build(self) -> TestApp {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(RecordingMailer::new());
        let served: Arc<dyn Store> = match self.wrap {
            Some(wrap) => wrap(store.clone()),
            None => store.clone(),
        };

        let state = AppState::new(self.config, served, mailer.clone(), self.permissions, None)
            .expect("Failed to build app state");
        let router = build_router(state.clone()).expect("Failed to build router");

        TestApp {
            router,
            state,
            store,
            mailer,
        }
    }
}

// ==================== Store wrappers ====================

/// Delegates to the memory store; account reads outside a unit of work
/// take `delay` first.
pub struct SlowStore {
    pub inner: Arc<MemoryStore>,
    pub delay: Duration,
}

/// Delegates to the memory store, but every unit of work fails on
/// `insert_invite`.
pub struct FailingInviteStore {
    pub inner: Arc<MemoryStore>,
}

struct FailingInviteUnit {
    inner: Box<dyn UnitOfWork>,
}

/// Delegates to the memory store and tracks how many account reads outside
/// a unit of work run at once. Each read takes `delay`.
pub struct CountingStore {
    pub inner: Arc<MemoryStore>,
    pub delay: Duration,
    pub in_flight: Arc<AtomicUsize>,
    pub peak: Arc<AtomicUsize>,
}

/// Delegates to the memory store and records, per committed or rolled back
/// unit of work, how long it stayed open.
pub struct TimedUnitStore {
    pub inner: Arc<MemoryStore>,
    pub held: Arc<Mutex<Vec<Duration>>>,
}

struct TimedUnit {
    inner: Box<dyn UnitOfWork>,
    opened: Instant,
    held: Arc<Mutex<Vec<Duration>>>,
}

macro_rules! delegate_store {
    ($ty:ty, |$self_:ident| $find_account:block, |$begin_self:ident, $inner:ident| $begin:block) => {
        #[async_trait]
        impl Store for $ty {
            async fn health_check(&self) -> Result<(), StoreError> {
                self.inner.health_check().await
            }

            async fn find_account_by_email(
                &self,
                kind: AccountKind,
                email: &str,
            ) -> Result<Option<Account>, StoreError> {
                self.inner.find_account_by_email(kind, email).await
            }

            async fn find_account(
                &self,
                kind: AccountKind,
                id: Uuid,
            ) -> Result<Option<Account>, StoreError> {
                let $self_ = self;
                $find_account;
                self.inner.find_account(kind, id).await
            }

            async fn insert_account(&self, account: &Account) -> Result<(), StoreError> {
                self.inner.insert_account(account).await
            }

            async fn find_organization(
                &self,
                id: Uuid,
            ) -> Result<Option<Organization>, StoreError> {
                self.inner.find_organization(id).await
            }

            async fn insert_organization(
                &self,
                organization: &Organization,
            ) -> Result<(), StoreError> {
                self.inner.insert_organization(organization).await
            }

            async fn delete_organization(&self, id: Uuid) -> Result<(), StoreError> {
                self.inner.delete_organization(id).await
            }

            async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
                let $begin_self = self;
                let $inner = self.inner.begin().await?;
                $begin
            }
        }
    };
}

delegate_store!(
    SlowStore,
    |store| {
        tokio::time::sleep(store.delay).await;
    },
    |_store, unit| { Ok(unit) }
);

delegate_store!(
    FailingInviteStore,
    |_store| {},
    |_store, unit| {
        let failing: Box<dyn UnitOfWork> = Box::new(FailingInviteUnit { inner: unit });
        Ok(failing)
    }
);

delegate_store!(
    CountingStore,
    |store| {
        let now = store.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        store.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(store.delay).await;
        store.in_flight.fetch_sub(1, Ordering::SeqCst);
    },
    |_store, unit| { Ok(unit) }
);

delegate_store!(
    TimedUnitStore,
    |_store| {},
    |store, unit| {
        let timed: Box<dyn UnitOfWork> = Box::new(TimedUnit {
            inner: unit,
            opened: Instant::now(),
            held: store.held.clone(),
        });
        Ok(timed)
    }
);

#[async_trait]
impl UnitOfWork for FailingInviteUnit {
    async fn insert_account(&mut self, account: &Account) -> Result<(), StoreError> {
        self.inner.insert_account(account).await
    }

    async fn insert_invite(&mut self, _invite: &Invite) -> Result<(), StoreError> {
        Err(StoreError::Backend(anyhow::anyhow!("injected invite failure")))
    }

    async fn find_account(
        &mut self,
        kind: AccountKind,
        id: Uuid,
    ) -> Result<Option<Account>, StoreError> {
        self.inner.find_account(kind, id).await
    }

    async fn update_account(
        &mut self,
        kind: AccountKind,
        id: Uuid,
        patch: &AccountPatch,
    ) -> Result<(), StoreError> {
        self.inner.update_account(kind, id, patch).await
    }

    async fn update_invite(
        &mut self,
        kind: AccountKind,
        id: Uuid,
        patch: &InvitePatch,
    ) -> Result<(), StoreError> {
        self.inner.update_invite(kind, id, patch).await
    }

    async fn lock_invite_by_hash(
        &mut self,
        kind: AccountKind,
        token_hash: &str,
    ) -> Result<Option<Invite>, StoreError> {
        self.inner.lock_invite_by_hash(kind, token_hash).await
    }

    async fn lock_invite_for_account(
        &mut self,
        kind: AccountKind,
        account_id: Uuid,
    ) -> Result<Option<Invite>, StoreError> {
        self.inner.lock_invite_for_account(kind, account_id).await
    }

    async fn lock_super_admin_exists(&mut self) -> Result<bool, StoreError> {
        self.inner.lock_super_admin_exists().await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.inner.rollback().await
    }
}

#[async_trait]
impl UnitOfWork for TimedUnit {
    async fn insert_account(&mut self, account: &Account) -> Result<(), StoreError> {
        self.inner.insert_account(account).await
    }

    async fn insert_invite(&mut self, invite: &Invite) -> Result<(), StoreError> {
        self.inner.insert_invite(invite).await
    }

    async fn find_account(
        &mut self,
        kind: AccountKind,
        id: Uuid,
    ) -> Result<Option<Account>, StoreError> {
        self.inner.find_account(kind, id).await
    }

    async fn update_account(
        &mut self,
        kind: AccountKind,
        id: Uuid,
        patch: &AccountPatch,
    ) -> Result<(), StoreError> {
        self.inner.update_account(kind, id, patch).await
    }

    async fn update_invite(
        &mut self,
        kind: AccountKind,
        id: Uuid,
        patch: &InvitePatch,
    ) -> Result<(), StoreError> {
        self.inner.update_invite(kind, id, patch).await
    }

    async fn lock_invite_by_hash(
        &mut self,
        kind: AccountKind,
        token_hash: &str,
    ) -> Result<Option<Invite>, StoreError> {
        self.inner.lock_invite_by_hash(kind, token_hash).await
    }

    async fn lock_invite_for_account(
        &mut self,
        kind: AccountKind,
        account_id: Uuid,
    ) -> Result<Option<Invite>, StoreError> {
        self.inner.lock_invite_for_account(kind, account_id).await
    }

    async fn lock_super_admin_exists(&mut self) -> Result<bool, StoreError> {
        self.inner.lock_super_admin_exists().await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let Self { inner, opened, held } = *self;
        let result = inner.commit().await;
        held.lock().unwrap().push(opened.elapsed());
        result
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        let Self { inner, opened, held } = *self;
        let result = inner.rollback().await;
        held.lock().unwrap().push(opened.elapsed());
        result
    }
}
