//! Invite and activation workflow.
//!
//! ```text
//!  (none)  --create-->    PENDING  [invite issued]
//!  PENDING --activate-->  ACTIVE   [invite consumed]
//!  PENDING --resend-->    PENDING  [invite rewritten, consumption cleared]
//! ```
//!
//! Every state change runs inside one [`UnitOfWork`](crate::db::UnitOfWork).
//! The plaintext secret is mailed only after commit, on a detached task.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use super::email::{InviteMessage, Mailer};
use super::error::ServiceError;
use crate::db::Store;
use crate::models::{Account, AccountKind, AccountPatch, Identity, Invite, InvitePatch, Permission};
use crate::utils::{hash_password_blocking, normalize_email, InviteSecret, Password, SecretHasher};

#[derive(Debug, Clone)]
pub struct NewAdmin {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub organization_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct Activation {
    pub token: String,
    pub password: Password,
    pub confirm_password: Password,
}

/// A pending account together with the expiry of its freshly issued invite.
#[derive(Debug, Clone)]
pub struct InviteIssued {
    pub account: Account,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct InviteService {
    store: Arc<dyn Store>,
    mailer: Arc<dyn Mailer>,
    hasher: SecretHasher,
    invite_ttl: Duration,
}

impl InviteService {
    pub fn new(
        store: Arc<dyn Store>,
        mailer: Arc<dyn Mailer>,
        hasher: SecretHasher,
        invite_ttl: Duration,
    ) -> Self {
        Self {
            store,
            mailer,
            hasher,
            invite_ttl,
        }
    }

    #[tracing::instrument(skip(self, actor, new), fields(actor = %actor.subject_id))]
    pub async fn create_admin(
        &self,
        actor: &Identity,
        new: NewAdmin,
    ) -> Result<InviteIssued, ServiceError> {
        require(actor, Permission::AdminCreate)?;

        let account = Account::pending_admin(new.name, normalize_email(&new.email), actor.subject_id);
        self.create_with_invite(account).await
    }

    #[tracing::instrument(
        skip(self, actor, new),
        fields(actor = %actor.subject_id, organization_id = %new.organization_id)
    )]
    pub async fn create_user(
        &self,
        actor: &Identity,
        new: NewUser,
    ) -> Result<InviteIssued, ServiceError> {
        require(actor, Permission::UsersCreate)?;

        let organization = self
            .store
            .find_organization(new.organization_id)
            .await?
            .ok_or(ServiceError::OrganizationNotFound)?;

        if !actor.may_manage(&organization) {
            return Err(ServiceError::NotOrganizationAdmin);
        }

        let account = Account::pending_user(
            new.name,
            normalize_email(&new.email),
            organization.id,
            actor.subject_id,
        );
        self.create_with_invite(account).await
    }

    /// Account row and invite row commit together or not at all.
    async fn create_with_invite(&self, account: Account) -> Result<InviteIssued, ServiceError> {
        let secret = InviteSecret::generate();
        let invite = Invite::new(
            account.kind,
            account.id,
            self.hasher.hash(secret.expose()),
            self.invite_ttl,
        );

        let mut unit = self.store.begin().await?;
        unit.insert_account(&account).await?;
        unit.insert_invite(&invite).await?;
        unit.commit().await?;

        tracing::info!(account_id = %account.id, kind = %account.kind, "Pending account created");

        self.dispatch(&account, secret, invite.expires_at);

        Ok(InviteIssued {
            account,
            expires_at: invite.expires_at,
        })
    }

    #[tracing::instrument(skip(self, activation), fields(kind = %kind))]
    pub async fn activate(
        &self,
        kind: AccountKind,
        activation: Activation,
    ) -> Result<Account, ServiceError> {
        if activation.password.as_str() != activation.confirm_password.as_str() {
            return Err(ServiceError::PasswordMismatch);
        }

        // Hash before opening the unit of work; no lock is held across Argon2.
        let password_hash = hash_password_blocking(activation.password).await?;
        let token_hash = self.hasher.hash(&activation.token);
        let mut unit = self.store.begin().await?;

        let invite = unit
            .lock_invite_by_hash(kind, &token_hash)
            .await?
            .ok_or(ServiceError::InvalidInvite)?;

        let now = Utc::now();
        if !invite.is_redeemable_at(now) {
            tracing::info!(invite_id = %invite.id, "Invite is consumed or expired");
            return Err(ServiceError::InvalidInvite);
        }

        let mut account = unit
            .find_account(kind, invite.account_id)
            .await?
            .ok_or(ServiceError::InvalidInvite)?;
        if account.is_active() {
            return Err(ServiceError::InvalidInvite);
        }

        let patch = AccountPatch::activated(password_hash);

        unit.update_account(kind, account.id, &patch).await?;
        unit.update_invite(kind, invite.id, &InvitePatch::consumed(now))
            .await?;
        unit.commit().await?;

        account.apply(&patch);
        tracing::info!(account_id = %account.id, "Account activated");

        Ok(account)
    }

    #[tracing::instrument(skip(self, email), fields(kind = %kind))]
    pub async fn resend(&self, kind: AccountKind, email: &str) -> Result<InviteIssued, ServiceError> {
        let email = normalize_email(email);

        let account = self
            .store
            .find_account_by_email(kind, &email)
            .await?
            .ok_or(ServiceError::AccountNotFound)?;
        if account.is_active() {
            return Err(ServiceError::AccountAlreadyActive);
        }

        let mut unit = self.store.begin().await?;

        let invite = unit
            .lock_invite_for_account(kind, account.id)
            .await?
            .ok_or(ServiceError::InviteNotFound)?;

        // An activation may have committed between the read above and the lock.
        let account = unit
            .find_account(kind, account.id)
            .await?
            .ok_or(ServiceError::AccountNotFound)?;
        if account.is_active() {
            return Err(ServiceError::AccountAlreadyActive);
        }

        let secret = InviteSecret::generate();
        let expires_at = Utc::now() + self.invite_ttl;
        let patch = InvitePatch::reissued(self.hasher.hash(secret.expose()), expires_at);

        unit.update_invite(kind, invite.id, &patch).await?;
        unit.commit().await?;

        tracing::info!(account_id = %account.id, "Invite reissued");

        self.dispatch(&account, secret, expires_at);

        Ok(InviteIssued {
            account,
            expires_at,
        })
    }

    /// Mails the invite in the background. Failures are logged only.
    fn dispatch(&self, account: &Account, secret: InviteSecret, expires_at: DateTime<Utc>) {
        let mailer = Arc::clone(&self.mailer);
        let message = InviteMessage {
            to: account.email.clone(),
            name: account.name.clone(),
            kind: account.kind,
            secret,
            expires_at,
        };
        let account_id = account.id;

        tokio::spawn(async move {
            if let Err(e) = mailer.send_invite(&message).await {
                tracing::error!(error = %e, %account_id, "Failed to send invite email");
            }
        });
    }
}

fn require(actor: &Identity, permission: Permission) -> Result<(), ServiceError> {
    if actor.has(permission) {
        Ok(())
    } else {
        Err(ServiceError::MissingPermission(permission))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{AccountStatus, Organization, PermissionModel, Role};
    use crate::services::RecordingMailer;

    struct Fixture {
        store: Arc<MemoryStore>,
        mailer: Arc<RecordingMailer>,
        service: InviteService,
        admin: Identity,
    }

    fn identity(id: Uuid, role: Role) -> Identity {
        Identity {
            subject_id: id,
            name: "Grace".into(),
            email: "grace@example.com".into(),
            role,
            permissions: *PermissionModel::standard().permissions_for(role),
            issued_at: Utc::now(),
            expires_at: Utc::now() + Duration::hours(1),
        }
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(RecordingMailer::new());
        let service = InviteService::new(
            store.clone(),
            mailer.clone(),
            SecretHasher::new(b"test-key").unwrap(),
            Duration::hours(24),
        );

        let root = Account::super_admin("Root".into(), "root@example.com".into(), "hash".into());
        store.insert_account(&root).await.unwrap();

        Fixture {
            store,
            mailer,
            service,
            admin: identity(root.id, Role::SuperAdmin),
        }
    }

    async fn sent_secret(mailer: &RecordingMailer, email: &str, count: usize) -> String {
        for _ in 0..100 {
            let messages: Vec<_> = mailer
                .messages()
                .into_iter()
                .filter(|m| m.to == email)
                .collect();
            if messages.len() >= count {
                return messages[count - 1].secret.expose().to_string();
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("no invite #{} for {}", count, email);
    }

    fn activation(token: &str) -> Activation {
        Activation {
            token: token.into(),
            password: Password::new("s3cret-pass".into()),
            confirm_password: Password::new("s3cret-pass".into()),
        }
    }

    #[tokio::test]
    async fn create_admin_persists_pending_account_and_hashed_invite() {
        let f = fixture().await;
        let issued = f
            .service
            .create_admin(
                &f.admin,
                NewAdmin {
                    name: "Ada".into(),
                    email: "Ada@Example.com".into(),
                },
            )
            .await
            .unwrap();

        assert_eq!(issued.account.email, "ada@example.com");
        assert_eq!(issued.account.status, AccountStatus::Pending);

        let secret = sent_secret(&f.mailer, "ada@example.com", 1).await;
        let invite = f
            .store
            .invite_for_account(AccountKind::Admin, issued.account.id)
            .await
            .unwrap();
        assert_ne!(invite.token_hash, secret);
        assert_eq!(invite.expires_at, issued.expires_at);
    }

    #[tokio::test]
    async fn create_without_permission_is_refused() {
        let f = fixture().await;
        let user = identity(Uuid::new_v4(), Role::User);

        let err = f
            .service
            .create_admin(
                &user,
                NewAdmin {
                    name: "Ada".into(),
                    email: "ada@example.com".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::MissingPermission(Permission::AdminCreate)));
    }

    #[tokio::test]
    async fn create_user_checks_organization_ownership() {
        let f = fixture().await;
        let owner = Account::pending_admin("Owner".into(), "owner@example.com".into(), f.admin.subject_id);
        f.store.insert_account(&owner).await.unwrap();
        let org = Organization::new("Acme".into(), "a@acme.co".into(), None, None, owner.id);
        f.store.insert_organization(&org).await.unwrap();

        let stranger = identity(Uuid::new_v4(), Role::Admin);
        let new_user = NewUser {
            name: "Bob".into(),
            email: "bob@example.com".into(),
            organization_id: org.id,
        };

        let err = f.service.create_user(&stranger, new_user.clone()).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotOrganizationAdmin));

        let issued = f
            .service
            .create_user(&identity(owner.id, Role::Admin), new_user)
            .await
            .unwrap();
        assert_eq!(issued.account.organization_id, Some(org.id));

        let missing = NewUser {
            name: "Eve".into(),
            email: "eve@example.com".into(),
            organization_id: Uuid::new_v4(),
        };
        let err = f
            .service
            .create_user(&identity(owner.id, Role::Admin), missing)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::OrganizationNotFound));
    }

    #[tokio::test]
    async fn activation_consumes_the_invite_once() {
        let f = fixture().await;
        let issued = f
            .service
            .create_admin(
                &f.admin,
                NewAdmin {
                    name: "Ada".into(),
                    email: "ada@example.com".into(),
                },
            )
            .await
            .unwrap();
        let secret = sent_secret(&f.mailer, "ada@example.com", 1).await;

        let account = f
            .service
            .activate(AccountKind::Admin, activation(&secret))
            .await
            .unwrap();
        assert!(account.is_active());
        assert!(account.password_hash.is_some());

        let invite = f
            .store
            .invite_for_account(AccountKind::Admin, issued.account.id)
            .await
            .unwrap();
        assert!(invite.is_consumed());

        let replay = f
            .service
            .activate(AccountKind::Admin, activation(&secret))
            .await
            .unwrap_err();
        assert!(matches!(replay, ServiceError::InvalidInvite));
    }

    #[tokio::test]
    async fn mismatched_confirmation_fails_before_lookup() {
        let f = fixture().await;
        let err = f
            .service
            .activate(
                AccountKind::User,
                Activation {
                    token: "whatever".into(),
                    password: Password::new("one".into()),
                    confirm_password: Password::new("two".into()),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::PasswordMismatch));
    }

    #[tokio::test]
    async fn expired_invite_is_invalid() {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(RecordingMailer::new());
        let service = InviteService::new(
            store.clone(),
            mailer.clone(),
            SecretHasher::new(b"test-key").unwrap(),
            Duration::seconds(-1),
        );
        let root = Account::super_admin("Root".into(), "root@example.com".into(), "hash".into());
        store.insert_account(&root).await.unwrap();

        service
            .create_admin(
                &identity(root.id, Role::SuperAdmin),
                NewAdmin {
                    name: "Ada".into(),
                    email: "ada@example.com".into(),
                },
            )
            .await
            .unwrap();
        let secret = sent_secret(&mailer, "ada@example.com", 1).await;

        let err = service
            .activate(AccountKind::Admin, activation(&secret))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInvite));
    }

    #[tokio::test]
    async fn activation_is_scoped_to_the_account_kind() {
        let f = fixture().await;
        f.service
            .create_admin(
                &f.admin,
                NewAdmin {
                    name: "Ada".into(),
                    email: "ada@example.com".into(),
                },
            )
            .await
            .unwrap();
        let secret = sent_secret(&f.mailer, "ada@example.com", 1).await;

        let err = f
            .service
            .activate(AccountKind::User, activation(&secret))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInvite));
    }

    #[tokio::test]
    async fn resend_replaces_the_secret() {
        let f = fixture().await;
        f.service
            .create_admin(
                &f.admin,
                NewAdmin {
                    name: "Ada".into(),
                    email: "ada@example.com".into(),
                },
            )
            .await
            .unwrap();
        let old = sent_secret(&f.mailer, "ada@example.com", 1).await;

        f.service.resend(AccountKind::Admin, "ADA@example.com").await.unwrap();
        let new = sent_secret(&f.mailer, "ada@example.com", 2).await;
        assert_ne!(old, new);

        let err = f
            .service
            .activate(AccountKind::Admin, activation(&old))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInvite));

        assert!(f.service.activate(AccountKind::Admin, activation(&new)).await.is_ok());

        let err = f.service.resend(AccountKind::Admin, "ada@example.com").await.unwrap_err();
        assert!(matches!(err, ServiceError::AccountAlreadyActive));
    }

    #[tokio::test]
    async fn resend_for_unknown_account_is_not_found() {
        let f = fixture().await;
        let err = f
            .service
            .resend(AccountKind::User, "nobody@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::AccountNotFound));
    }

    #[tokio::test]
    async fn mail_failure_does_not_undo_creation() {
        let store = Arc::new(MemoryStore::new());
        let service = InviteService::new(
            store.clone(),
            Arc::new(RecordingMailer::failing()),
            SecretHasher::new(b"test-key").unwrap(),
            Duration::hours(24),
        );
        let root = Account::super_admin("Root".into(), "root@example.com".into(), "hash".into());
        store.insert_account(&root).await.unwrap();

        service
            .create_admin(
                &identity(root.id, Role::SuperAdmin),
                NewAdmin {
                    name: "Ada".into(),
                    email: "ada@example.com".into(),
                },
            )
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let account = store
            .find_account_by_email(AccountKind::Admin, "ada@example.com")
            .await
            .unwrap();
        assert!(account.is_some());
    }
}
