//! In-memory store.
//!
//! Mirrors the Postgres constraints (unique emails, one invite per account,
//! users pinned to an existing organization). A unit of work holds the table
//! lock for its whole lifetime and works on a staged copy that replaces the
//! live tables on commit, so store calls must not be issued while a unit of
//! work is open on the same task.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{Store, StoreError, UnitOfWork};
use crate::models::{
    Account, AccountKind, AccountPatch, Invite, InvitePatch, Organization, Role,
};

#[derive(Debug, Clone, Default)]
struct Tables {
    accounts: HashMap<Uuid, Account>,
    invites: HashMap<Uuid, Invite>,
    organizations: HashMap<Uuid, Organization>,
}

impl Tables {
    fn account(&self, kind: AccountKind, id: Uuid) -> Option<&Account> {
        self.accounts.get(&id).filter(|a| a.kind == kind)
    }

    fn account_by_email(&self, kind: AccountKind, email: &str) -> Option<&Account> {
        self.accounts
            .values()
            .find(|a| a.kind == kind && a.email == email)
    }

    fn insert_account(&mut self, account: &Account) -> Result<(), StoreError> {
        if self.account_by_email(account.kind, &account.email).is_some()
            || self.accounts.contains_key(&account.id)
        {
            return Err(StoreError::Conflict(
                "account with email already exists".into(),
            ));
        }
        if account.kind == AccountKind::User {
            let org_exists = account
                .organization_id
                .is_some_and(|id| self.organizations.contains_key(&id));
            if !org_exists {
                return Err(StoreError::Conflict("organization does not exist".into()));
            }
        }
        self.accounts.insert(account.id, account.clone());
        Ok(())
    }

    fn insert_invite(&mut self, invite: &Invite) -> Result<(), StoreError> {
        if self.account(invite.kind, invite.account_id).is_none() {
            return Err(StoreError::Conflict("account does not exist".into()));
        }
        let duplicate = self.invites.values().any(|i| {
            i.kind == invite.kind
                && (i.account_id == invite.account_id || i.token_hash == invite.token_hash)
        });
        if duplicate || self.invites.contains_key(&invite.id) {
            return Err(StoreError::Conflict("invite already exists".into()));
        }
        self.invites.insert(invite.id, invite.clone());
        Ok(())
    }

    fn invite_where(&self, kind: AccountKind, pred: impl Fn(&Invite) -> bool) -> Option<Invite> {
        self.invites
            .values()
            .find(|i| i.kind == kind && pred(i))
            .cloned()
    }
}

/// Process-local [`Store`] used by tests and local development.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invite currently recorded for an account. Test and diagnostics helper.
    pub async fn invite_for_account(&self, kind: AccountKind, account_id: Uuid) -> Option<Invite> {
        self.tables
            .lock()
            .await
            .invite_where(kind, |i| i.account_id == account_id)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn find_account_by_email(
        &self,
        kind: AccountKind,
        email: &str,
    ) -> Result<Option<Account>, StoreError> {
        Ok(self
            .tables
            .lock()
            .await
            .account_by_email(kind, email)
            .cloned())
    }

    async fn find_account(
        &self,
        kind: AccountKind,
        id: Uuid,
    ) -> Result<Option<Account>, StoreError> {
        Ok(self.tables.lock().await.account(kind, id).cloned())
    }

    async fn insert_account(&self, account: &Account) -> Result<(), StoreError> {
        self.tables.lock().await.insert_account(account)
    }

    async fn find_organization(&self, id: Uuid) -> Result<Option<Organization>, StoreError> {
        Ok(self.tables.lock().await.organizations.get(&id).cloned())
    }

    async fn insert_organization(&self, organization: &Organization) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        if tables
            .organizations
            .values()
            .any(|o| o.email == organization.email)
        {
            return Err(StoreError::Conflict(
                "organization with email already exists".into(),
            ));
        }
        if tables.account(AccountKind::Admin, organization.admin_id).is_none() {
            return Err(StoreError::Conflict("admin does not exist".into()));
        }
        tables
            .organizations
            .insert(organization.id, organization.clone());
        Ok(())
    }

    async fn delete_organization(&self, id: Uuid) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        if !tables.organizations.contains_key(&id) {
            return Err(StoreError::NotFound);
        }
        if tables
            .accounts
            .values()
            .any(|a| a.organization_id == Some(id))
        {
            return Err(StoreError::Conflict("organization still has users".into()));
        }
        tables.organizations.remove(&id);
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let staged = Tables::clone(&guard);
        Ok(Box::new(MemoryUnitOfWork { guard, staged }))
    }
}

pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<Tables>,
    staged: Tables,
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn insert_account(&mut self, account: &Account) -> Result<(), StoreError> {
        self.staged.insert_account(account)
    }

    async fn insert_invite(&mut self, invite: &Invite) -> Result<(), StoreError> {
        self.staged.insert_invite(invite)
    }

    async fn find_account(
        &mut self,
        kind: AccountKind,
        id: Uuid,
    ) -> Result<Option<Account>, StoreError> {
        Ok(self.staged.account(kind, id).cloned())
    }

    async fn update_account(
        &mut self,
        kind: AccountKind,
        id: Uuid,
        patch: &AccountPatch,
    ) -> Result<(), StoreError> {
        match self.staged.accounts.get_mut(&id).filter(|a| a.kind == kind) {
            Some(account) => {
                account.apply(patch);
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }

    async fn update_invite(
        &mut self,
        kind: AccountKind,
        id: Uuid,
        patch: &InvitePatch,
    ) -> Result<(), StoreError> {
        if let Some(hash) = &patch.token_hash {
            let taken = self
                .staged
                .invites
                .values()
                .any(|i| i.kind == kind && i.id != id && &i.token_hash == hash);
            if taken {
                return Err(StoreError::Conflict("invite already exists".into()));
            }
        }
        match self.staged.invites.get_mut(&id).filter(|i| i.kind == kind) {
            Some(invite) => {
                invite.apply(patch);
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }

    async fn lock_invite_by_hash(
        &mut self,
        kind: AccountKind,
        token_hash: &str,
    ) -> Result<Option<Invite>, StoreError> {
        Ok(self.staged.invite_where(kind, |i| i.token_hash == token_hash))
    }

    async fn lock_invite_for_account(
        &mut self,
        kind: AccountKind,
        account_id: Uuid,
    ) -> Result<Option<Invite>, StoreError> {
        Ok(self.staged.invite_where(kind, |i| i.account_id == account_id))
    }

    async fn lock_super_admin_exists(&mut self) -> Result<bool, StoreError> {
        Ok(self
            .staged
            .accounts
            .values()
            .any(|a| a.role == Role::SuperAdmin))
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryUnitOfWork { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
