use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{
    organization::Organization,
    permission::{Permission, PermissionSet},
    role::Role,
};

/// The authenticated caller, rebuilt from the session token on every request.
#[derive(Debug, Clone, Serialize)]
pub struct Identity {
    pub subject_id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub permissions: PermissionSet,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Identity {
    pub fn has(&self, permission: Permission) -> bool {
        self.permissions.contains(permission)
    }

    pub fn is_super_admin(&self) -> bool {
        self.role == Role::SuperAdmin
    }

    /// Admin of record for `organization`, or a super admin.
    pub fn may_manage(&self, organization: &Organization) -> bool {
        self.is_super_admin() || organization.admin_id == self.subject_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(role: Role) -> Identity {
        Identity {
            subject_id: Uuid::new_v4(),
            name: "Ada".into(),
            email: "ada@example.com".into(),
            role,
            permissions: PermissionSet::empty(),
            issued_at: Utc::now(),
            expires_at: Utc::now(),
        }
    }

    #[test]
    fn only_owner_or_super_admin_manages_organization() {
        let owner = identity(Role::Admin);
        let org = Organization::new("Acme".into(), "a@acme.co".into(), None, None, owner.subject_id);

        assert!(owner.may_manage(&org));
        assert!(!identity(Role::Admin).may_manage(&org));
        assert!(identity(Role::SuperAdmin).may_manage(&org));
    }
}
