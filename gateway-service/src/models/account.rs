//! Account model - admins and users share one lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::role::Role;

/// Which account table a record lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Admin,
    User,
}

impl AccountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::Admin => "admin",
            AccountKind::User => "user",
        }
    }
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Pending,
    Active,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Pending => "pending",
            AccountStatus::Active => "active",
        }
    }
}

impl FromStr for AccountStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AccountStatus::Pending),
            "active" => Ok(AccountStatus::Active),
            other => Err(format!("unknown account status: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Account {
    pub id: Uuid,
    pub kind: AccountKind,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub status: AccountStatus,
    pub password_hash: Option<String>,
    pub organization_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    fn pending(kind: AccountKind, role: Role, name: String, email: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            name,
            email,
            role,
            status: AccountStatus::Pending,
            password_hash: None,
            organization_id: None,
            created_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A pending admin awaiting activation.
    pub fn pending_admin(name: String, email: String, created_by: Uuid) -> Self {
        Self {
            created_by: Some(created_by),
            ..Self::pending(AccountKind::Admin, Role::Admin, name, email)
        }
    }

    /// A pending user inside `organization_id`.
    pub fn pending_user(
        name: String,
        email: String,
        organization_id: Uuid,
        created_by: Uuid,
    ) -> Self {
        Self {
            organization_id: Some(organization_id),
            created_by: Some(created_by),
            ..Self::pending(AccountKind::User, Role::User, name, email)
        }
    }

    /// The first operator, created already active by bootstrap.
    pub fn super_admin(name: String, email: String, password_hash: String) -> Self {
        Self {
            status: AccountStatus::Active,
            password_hash: Some(password_hash),
            ..Self::pending(AccountKind::Admin, Role::SuperAdmin, name, email)
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    pub fn apply(&mut self, patch: &AccountPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(hash) = &patch.password_hash {
            self.password_hash = Some(hash.clone());
        }
        self.updated_at = Utc::now();
    }
}

/// Partial update of an account row.
#[derive(Debug, Clone, Default)]
pub struct AccountPatch {
    pub status: Option<AccountStatus>,
    pub password_hash: Option<String>,
}

impl AccountPatch {
    pub fn activated(password_hash: String) -> Self {
        Self {
            status: Some(AccountStatus::Active),
            password_hash: Some(password_hash),
        }
    }
}

/// Account as exposed over the API (no credential hash).
#[derive(Debug, Clone, Serialize)]
pub struct AccountResponse {
    pub id: Uuid,
    pub kind: AccountKind,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub status: AccountStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Account> for AccountResponse {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            kind: account.kind,
            name: account.name.clone(),
            email: account.email.clone(),
            role: account.role,
            status: account.status,
            organization_id: account.organization_id,
            created_by: account.created_by,
            created_at: account.created_at,
            updated_at: account.updated_at,
        }
    }
}
