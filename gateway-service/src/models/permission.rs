//! Permissions and the role -> permission table.
//!
//! The table is built once at startup and shared read-only behind an `Arc`;
//! lookups never lock.

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use super::role::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    #[serde(rename = "users:create")]
    UsersCreate,
    #[serde(rename = "users:update")]
    UsersUpdate,
    #[serde(rename = "users:delete")]
    UsersDelete,
    #[serde(rename = "admin:create")]
    AdminCreate,
    #[serde(rename = "admin:update")]
    AdminUpdate,
    #[serde(rename = "admin:delete")]
    AdminDelete,
    #[serde(rename = "roles:assign")]
    RolesAssign,
    #[serde(rename = "settings:system")]
    SettingsSystem,
    #[serde(rename = "settings:org")]
    SettingsOrg,
    #[serde(rename = "logs:view")]
    LogsView,
    #[serde(rename = "posts:create")]
    PostsCreate,
    #[serde(rename = "posts:update")]
    PostsUpdate,
    #[serde(rename = "posts:delete")]
    PostsDelete,
    #[serde(rename = "organization:create")]
    OrganizationCreate,
    #[serde(rename = "organization:view")]
    OrganizationView,
    #[serde(rename = "organization:update")]
    OrganizationUpdate,
    #[serde(rename = "organization:delete")]
    OrganizationDelete,
    #[serde(rename = "organization:suspend")]
    OrganizationSuspend,
}

impl Permission {
    pub const ALL: [Permission; 18] = [
        Permission::UsersCreate,
        Permission::UsersUpdate,
        Permission::UsersDelete,
        Permission::AdminCreate,
        Permission::AdminUpdate,
        Permission::AdminDelete,
        Permission::RolesAssign,
        Permission::SettingsSystem,
        Permission::SettingsOrg,
        Permission::LogsView,
        Permission::PostsCreate,
        Permission::PostsUpdate,
        Permission::PostsDelete,
        Permission::OrganizationCreate,
        Permission::OrganizationView,
        Permission::OrganizationUpdate,
        Permission::OrganizationDelete,
        Permission::OrganizationSuspend,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::UsersCreate => "users:create",
            Permission::UsersUpdate => "users:update",
            Permission::UsersDelete => "users:delete",
            Permission::AdminCreate => "admin:create",
            Permission::AdminUpdate => "admin:update",
            Permission::AdminDelete => "admin:delete",
            Permission::RolesAssign => "roles:assign",
            Permission::SettingsSystem => "settings:system",
            Permission::SettingsOrg => "settings:org",
            Permission::LogsView => "logs:view",
            Permission::PostsCreate => "posts:create",
            Permission::PostsUpdate => "posts:update",
            Permission::PostsDelete => "posts:delete",
            Permission::OrganizationCreate => "organization:create",
            Permission::OrganizationView => "organization:view",
            Permission::OrganizationUpdate => "organization:update",
            Permission::OrganizationDelete => "organization:delete",
            Permission::OrganizationSuspend => "organization:suspend",
        }
    }

    fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown permission: {}", s))
    }
}

/// A set of permissions packed into a bit mask.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PermissionSet(u32);

impl PermissionSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn contains(&self, permission: Permission) -> bool {
        self.0 & permission.bit() != 0
    }

    pub fn insert(&mut self, permission: Permission) {
        self.0 |= permission.bit();
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = Permission> + '_ {
        Permission::ALL.into_iter().filter(|p| self.contains(*p))
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        let mut set = PermissionSet::empty();
        for permission in iter {
            set.insert(permission);
        }
        set
    }
}

impl fmt::Debug for PermissionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter().map(|p| p.as_str())).finish()
    }
}

impl Serialize for PermissionSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

/// Immutable role -> permission table.
#[derive(Debug, Clone)]
pub struct PermissionModel {
    table: [PermissionSet; Role::ALL.len()],
}

impl PermissionModel {
    /// The table the platform ships with.
    pub fn standard() -> Self {
        use Permission::*;

        Self::from_table([
            (
                Role::SuperAdmin,
                [
                    AdminCreate,
                    AdminUpdate,
                    AdminDelete,
                    UsersDelete,
                    RolesAssign,
                    SettingsSystem,
                    SettingsOrg,
                    LogsView,
                    PostsUpdate,
                    PostsDelete,
                ]
                .into_iter()
                .collect(),
            ),
            (
                Role::Admin,
                [
                    UsersCreate,
                    UsersUpdate,
                    UsersDelete,
                    RolesAssign,
                    SettingsOrg,
                    LogsView,
                    PostsUpdate,
                    PostsDelete,
                    OrganizationCreate,
                    OrganizationView,
                    OrganizationUpdate,
                    OrganizationDelete,
                    OrganizationSuspend,
                ]
                .into_iter()
                .collect(),
            ),
            (
                Role::User,
                [PostsCreate, PostsUpdate, PostsDelete].into_iter().collect(),
            ),
        ])
    }

    /// Roles missing from `entries` get the empty set.
    pub fn from_table(entries: impl IntoIterator<Item = (Role, PermissionSet)>) -> Self {
        let mut table = [PermissionSet::empty(); Role::ALL.len()];
        for (role, permissions) in entries {
            table[role as usize] = permissions;
        }
        Self { table }
    }

    pub fn permissions_for(&self, role: Role) -> &PermissionSet {
        &self.table[role as usize]
    }

    /// Fail-closed lookup by wire tag: unknown roles hold nothing.
    pub fn permissions_for_tag(&self, tag: &str) -> PermissionSet {
        self.resolve(tag)
            .map(|(_, permissions)| permissions)
            .unwrap_or_default()
    }

    pub fn has_permission(&self, role: Role, permission: Permission) -> bool {
        self.permissions_for(role).contains(permission)
    }

    pub fn resolve(&self, tag: &str) -> Option<(Role, PermissionSet)> {
        let role = tag.parse::<Role>().ok()?;
        Some((role, *self.permissions_for(role)))
    }
}

impl Default for PermissionModel {
    fn default() -> Self {
        Self::standard()
    }
}
