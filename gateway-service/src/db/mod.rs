//! Persistence: the store contract plus its Postgres and in-memory backends.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::models::{Account, AccountKind, AccountPatch, Invite, InvitePatch, Organization};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Unique or foreign-key constraint rejected the write.
    #[error("{0}")]
    Conflict(String),

    #[error("record not found")]
    NotFound,

    #[error("store backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => AppError::conflict(msg),
            StoreError::NotFound => AppError::not_found("record not found"),
            StoreError::Backend(e) => AppError::InternalError(e),
        }
    }
}

/// Row-level access outside of a transaction.
#[async_trait]
pub trait Store: Send + Sync {
    async fn health_check(&self) -> Result<(), StoreError>;

    async fn find_account_by_email(
        &self,
        kind: AccountKind,
        email: &str,
    ) -> Result<Option<Account>, StoreError>;

    async fn find_account(&self, kind: AccountKind, id: Uuid)
        -> Result<Option<Account>, StoreError>;

    async fn insert_account(&self, account: &Account) -> Result<(), StoreError>;

    async fn find_organization(&self, id: Uuid) -> Result<Option<Organization>, StoreError>;

    async fn insert_organization(&self, organization: &Organization) -> Result<(), StoreError>;

    /// Fails with `Conflict` while users still belong to the organization.
    async fn delete_organization(&self, id: Uuid) -> Result<(), StoreError>;

    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError>;
}

/// An open transaction. Dropping it without `commit` rolls everything back.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn insert_account(&mut self, account: &Account) -> Result<(), StoreError>;

    async fn insert_invite(&mut self, invite: &Invite) -> Result<(), StoreError>;

    async fn find_account(
        &mut self,
        kind: AccountKind,
        id: Uuid,
    ) -> Result<Option<Account>, StoreError>;

    async fn update_account(
        &mut self,
        kind: AccountKind,
        id: Uuid,
        patch: &AccountPatch,
    ) -> Result<(), StoreError>;

    async fn update_invite(
        &mut self,
        kind: AccountKind,
        id: Uuid,
        patch: &InvitePatch,
    ) -> Result<(), StoreError>;

    /// Reads the invite with this hash and holds it until the unit ends.
    async fn lock_invite_by_hash(
        &mut self,
        kind: AccountKind,
        token_hash: &str,
    ) -> Result<Option<Invite>, StoreError>;

    /// Reads the account's invite and holds it until the unit ends.
    async fn lock_invite_for_account(
        &mut self,
        kind: AccountKind,
        account_id: Uuid,
    ) -> Result<Option<Invite>, StoreError>;

    /// Serializes concurrent bootstraps, then reports whether a super admin exists.
    async fn lock_super_admin_exists(&mut self) -> Result<bool, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Create a PostgreSQL connection pool.
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, AppError> {
    tracing::info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&config.url)
        .await
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("database connect: {}", e)))?;

    tracing::info!("Successfully connected to PostgreSQL");

    Ok(pool)
}

/// Run embedded migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), AppError> {
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("migrations: {}", e)))?;
    tracing::info!("Database migrations completed");
    Ok(())
}
