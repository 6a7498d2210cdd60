use std::sync::Arc;

use super::error::ServiceError;
use super::jwt::{IssuedToken, TokenCodec};
use crate::db::Store;
use crate::models::{Account, AccountKind, Identity, Role};
use crate::utils::{hash_password_blocking, normalize_email, verify_password_blocking, Password};

/// A signed-in account and its session token.
#[derive(Debug, Clone)]
pub struct Session {
    pub account: Account,
    pub token: IssuedToken,
}

#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn Store>,
    codec: TokenCodec,
}

impl AccountService {
    pub fn new(store: Arc<dyn Store>, codec: TokenCodec) -> Self {
        Self { store, codec }
    }

    #[tracing::instrument(skip(self, email, password), fields(kind = %kind))]
    pub async fn login(
        &self,
        kind: AccountKind,
        email: &str,
        password: Password,
    ) -> Result<Session, ServiceError> {
        let account = self
            .store
            .find_account_by_email(kind, &normalize_email(email))
            .await?
            .ok_or(ServiceError::InvalidCredentials)?;

        let Some(password_hash) = account.password_hash.clone() else {
            return Err(if account.is_active() {
                ServiceError::InvalidCredentials
            } else {
                ServiceError::AccountNotActivated
            });
        };

        if !verify_password_blocking(password, password_hash).await? {
            tracing::info!(account_id = %account.id, "Login rejected: wrong password");
            return Err(ServiceError::InvalidCredentials);
        }

        if !account.is_active() {
            return Err(ServiceError::AccountNotActivated);
        }

        let token = self.codec.issue(&account)?;
        tracing::info!(account_id = %account.id, "Login succeeded");

        Ok(Session { account, token })
    }

    /// Creates the first super admin. Refused once one exists.
    #[tracing::instrument(skip(self, email, password))]
    pub async fn bootstrap(
        &self,
        name: String,
        email: &str,
        password: Password,
    ) -> Result<Session, ServiceError> {
        let password_hash = hash_password_blocking(password).await?;
        let account = Account::super_admin(name, normalize_email(email), password_hash);

        let mut unit = self.store.begin().await?;
        if unit.lock_super_admin_exists().await? {
            return Err(ServiceError::SuperAdminExists);
        }
        unit.insert_account(&account).await?;
        unit.commit().await?;

        tracing::info!(account_id = %account.id, "Super admin bootstrapped");

        let token = self.codec.issue(&account)?;
        Ok(Session { account, token })
    }

    /// The stored account behind an authenticated identity.
    pub async fn profile(&self, identity: &Identity) -> Result<Account, ServiceError> {
        let kind = match identity.role {
            Role::User => AccountKind::User,
            Role::Admin | Role::SuperAdmin => AccountKind::Admin,
        };

        self.store
            .find_account(kind, identity.subject_id)
            .await?
            .ok_or(ServiceError::AccountNotFound)
    }
}
