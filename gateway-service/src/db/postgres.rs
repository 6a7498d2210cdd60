//! PostgreSQL store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPool, FromRow, PgExecutor, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use super::{Store, StoreError, UnitOfWork};
use crate::models::{Account, AccountKind, AccountPatch, Invite, InvitePatch, Organization};

const ADMIN_COLUMNS: &str = "id, name, email, role, status, password_hash, \
     NULL::uuid AS organization_id, created_by, created_at, updated_at";
const USER_COLUMNS: &str = "id, name, email, role, status, password_hash, \
     organization_id, created_by, created_at, updated_at";
const INVITE_COLUMNS: &str = "id, account_id, token_hash, created_at, expires_at, consumed_at";

const DUPLICATE_ACCOUNT: &str = "account with email already exists";

struct Tables {
    accounts: &'static str,
    invites: &'static str,
    columns: &'static str,
}

fn tables(kind: AccountKind) -> Tables {
    match kind {
        AccountKind::Admin => Tables {
            accounts: "admins",
            invites: "admin_invites",
            columns: ADMIN_COLUMNS,
        },
        AccountKind::User => Tables {
            accounts: "users",
            invites: "user_invites",
            columns: USER_COLUMNS,
        },
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(anyhow::Error::new(err))
}

/// Maps constraint violations to `Conflict`, everything else to `Backend`.
fn classify(err: sqlx::Error, unique: &str, foreign_key: &str) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return StoreError::Conflict(unique.to_string());
        }
        if db.is_foreign_key_violation() {
            return StoreError::Conflict(foreign_key.to_string());
        }
    }
    backend(err)
}

#[derive(FromRow)]
struct AccountRow {
    id: Uuid,
    name: String,
    email: String,
    role: String,
    status: String,
    password_hash: Option<String>,
    organization_id: Option<Uuid>,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl AccountRow {
    fn into_account(self, kind: AccountKind) -> Result<Account, StoreError> {
        let role = self
            .role
            .parse()
            .map_err(|e| StoreError::Backend(anyhow::Error::new(e)))?;
        let status = self
            .status
            .parse()
            .map_err(|e: String| StoreError::Backend(anyhow::anyhow!(e)))?;

        Ok(Account {
            id: self.id,
            kind,
            name: self.name,
            email: self.email,
            role,
            status,
            password_hash: self.password_hash,
            organization_id: self.organization_id,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct InviteRow {
    id: Uuid,
    account_id: Uuid,
    token_hash: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    consumed_at: Option<DateTime<Utc>>,
}

impl InviteRow {
    fn into_invite(self, kind: AccountKind) -> Invite {
        Invite {
            id: self.id,
            kind,
            account_id: self.account_id,
            token_hash: self.token_hash,
            created_at: self.created_at,
            expires_at: self.expires_at,
            consumed_at: self.consumed_at,
        }
    }
}

// ==================== Shared Queries ====================

/// Unique columns an account or invite can be looked up by.
enum Key<'a> {
    Id(Uuid),
    Email(&'a str),
    TokenHash(&'a str),
    AccountId(Uuid),
}

impl Key<'_> {
    fn column(&self) -> &'static str {
        match self {
            Key::Id(_) => "id",
            Key::Email(_) => "email",
            Key::TokenHash(_) => "token_hash",
            Key::AccountId(_) => "account_id",
        }
    }
}

fn bind_key<'q, O>(
    query: sqlx::query::QueryAs<'q, Postgres, O, sqlx::postgres::PgArguments>,
    key: &Key<'q>,
) -> sqlx::query::QueryAs<'q, Postgres, O, sqlx::postgres::PgArguments> {
    match *key {
        Key::Id(id) | Key::AccountId(id) => query.bind(id),
        Key::Email(value) | Key::TokenHash(value) => query.bind(value),
    }
}

async fn fetch_account<'e>(
    executor: impl PgExecutor<'e>,
    kind: AccountKind,
    key: Key<'_>,
) -> Result<Option<Account>, StoreError> {
    let t = tables(kind);
    let sql = format!(
        "SELECT {} FROM {} WHERE {} = $1",
        t.columns,
        t.accounts,
        key.column()
    );

    bind_key(sqlx::query_as::<_, AccountRow>(&sql), &key)
        .fetch_optional(executor)
        .await
        .map_err(backend)?
        .map(|row| row.into_account(kind))
        .transpose()
}

async fn insert_account_row<'e>(
    executor: impl PgExecutor<'e>,
    account: &Account,
) -> Result<(), StoreError> {
    let query = match account.kind {
        AccountKind::Admin => sqlx::query(
            r#"
            INSERT INTO admins (id, name, email, role, status, password_hash, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(account.id)
        .bind(&account.name)
        .bind(&account.email)
        .bind(account.role.as_str())
        .bind(account.status.as_str())
        .bind(&account.password_hash)
        .bind(account.created_by)
        .bind(account.created_at)
        .bind(account.updated_at),
        AccountKind::User => sqlx::query(
            r#"
            INSERT INTO users (id, name, email, role, status, password_hash, organization_id, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(account.id)
        .bind(&account.name)
        .bind(&account.email)
        .bind(account.role.as_str())
        .bind(account.status.as_str())
        .bind(&account.password_hash)
        .bind(account.organization_id)
        .bind(account.created_by)
        .bind(account.created_at)
        .bind(account.updated_at),
    };

    query
        .execute(executor)
        .await
        .map_err(|e| classify(e, DUPLICATE_ACCOUNT, "organization does not exist"))?;
    Ok(())
}

/// PostgreSQL-backed [`Store`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Database health check failed: {}", e);
                backend(e)
            })?;
        Ok(())
    }

    async fn find_account_by_email(
        &self,
        kind: AccountKind,
        email: &str,
    ) -> Result<Option<Account>, StoreError> {
        fetch_account(&self.pool, kind, Key::Email(email)).await
    }

    async fn find_account(
        &self,
        kind: AccountKind,
        id: Uuid,
    ) -> Result<Option<Account>, StoreError> {
        fetch_account(&self.pool, kind, Key::Id(id)).await
    }

    async fn insert_account(&self, account: &Account) -> Result<(), StoreError> {
        insert_account_row(&self.pool, account).await
    }

    async fn find_organization(&self, id: Uuid) -> Result<Option<Organization>, StoreError> {
        sqlx::query_as::<_, Organization>(
            r#"
            SELECT id, name, email, description, website, admin_id, created_at, updated_at
            FROM organizations WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)
    }

    async fn insert_organization(&self, organization: &Organization) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO organizations (id, name, email, description, website, admin_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(organization.id)
        .bind(&organization.name)
        .bind(&organization.email)
        .bind(&organization.description)
        .bind(&organization.website)
        .bind(organization.admin_id)
        .bind(organization.created_at)
        .bind(organization.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            classify(
                e,
                "organization with email already exists",
                "admin does not exist",
            )
        })?;
        Ok(())
    }

    async fn delete_organization(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM organizations WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| classify(e, "organization conflict", "organization still has users"))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let tx = self.pool.begin().await.map_err(backend)?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }
}

/// A Postgres transaction. sqlx rolls it back when dropped uncommitted.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

impl PgUnitOfWork {
    async fn lock_invite(
        &mut self,
        kind: AccountKind,
        key: Key<'_>,
    ) -> Result<Option<Invite>, StoreError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = $1 FOR UPDATE",
            INVITE_COLUMNS,
            tables(kind).invites,
            key.column()
        );

        let row = bind_key(sqlx::query_as::<_, InviteRow>(&sql), &key)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(backend)?;

        Ok(row.map(|r| r.into_invite(kind)))
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn insert_account(&mut self, account: &Account) -> Result<(), StoreError> {
        insert_account_row(&mut *self.tx, account).await
    }

    async fn insert_invite(&mut self, invite: &Invite) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ($1, $2, $3, $4, $5, $6)",
            tables(invite.kind).invites,
            INVITE_COLUMNS
        );

        sqlx::query(&sql)
            .bind(invite.id)
            .bind(invite.account_id)
            .bind(&invite.token_hash)
            .bind(invite.created_at)
            .bind(invite.expires_at)
            .bind(invite.consumed_at)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| classify(e, "invite already exists", "account does not exist"))?;
        Ok(())
    }

    async fn find_account(
        &mut self,
        kind: AccountKind,
        id: Uuid,
    ) -> Result<Option<Account>, StoreError> {
        fetch_account(&mut *self.tx, kind, Key::Id(id)).await
    }

    async fn update_account(
        &mut self,
        kind: AccountKind,
        id: Uuid,
        patch: &AccountPatch,
    ) -> Result<(), StoreError> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("UPDATE {} SET updated_at = ", tables(kind).accounts));
        qb.push_bind(Utc::now());
        if let Some(status) = patch.status {
            qb.push(", status = ").push_bind(status.as_str());
        }
        if let Some(hash) = &patch.password_hash {
            qb.push(", password_hash = ").push_bind(hash.clone());
        }
        qb.push(" WHERE id = ").push_bind(id);

        let result = qb
            .build()
            .execute(&mut *self.tx)
            .await
            .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn update_invite(
        &mut self,
        kind: AccountKind,
        id: Uuid,
        patch: &InvitePatch,
    ) -> Result<(), StoreError> {
        if patch.is_empty() {
            return Ok(());
        }

        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("UPDATE {} SET ", tables(kind).invites));
        let mut set = qb.separated(", ");
        if let Some(hash) = &patch.token_hash {
            set.push("token_hash = ").push_bind_unseparated(hash.clone());
        }
        if let Some(expires_at) = patch.expires_at {
            set.push("expires_at = ").push_bind_unseparated(expires_at);
        }
        if let Some(consumed_at) = patch.consumed_at {
            set.push("consumed_at = ").push_bind_unseparated(consumed_at);
        }
        qb.push(" WHERE id = ").push_bind(id);

        let result = qb
            .build()
            .execute(&mut *self.tx)
            .await
            .map_err(|e| classify(e, "invite already exists", "account does not exist"))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn lock_invite_by_hash(
        &mut self,
        kind: AccountKind,
        token_hash: &str,
    ) -> Result<Option<Invite>, StoreError> {
        self.lock_invite(kind, Key::TokenHash(token_hash)).await
    }

    async fn lock_invite_for_account(
        &mut self,
        kind: AccountKind,
        account_id: Uuid,
    ) -> Result<Option<Invite>, StoreError> {
        self.lock_invite(kind, Key::AccountId(account_id)).await
    }

    async fn lock_super_admin_exists(&mut self) -> Result<bool, StoreError> {
        sqlx::query("LOCK TABLE admins IN SHARE ROW EXCLUSIVE MODE")
            .execute(&mut *self.tx)
            .await
            .map_err(backend)?;

        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM admins WHERE role = 'super_admin')",
        )
        .fetch_one(&mut *self.tx)
        .await
        .map_err(backend)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(backend)
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await.map_err(backend)
    }
}
