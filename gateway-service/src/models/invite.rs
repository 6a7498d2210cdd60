//! Invite model - one-time activation secret (stored hashed) per pending account.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::account::AccountKind;

#[derive(Debug, Clone)]
pub struct Invite {
    pub id: Uuid,
    pub kind: AccountKind,
    pub account_id: Uuid,
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
}

impl Invite {
    pub fn new(kind: AccountKind, account_id: Uuid, token_hash: String, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            account_id,
            token_hash,
            created_at: now,
            expires_at: now + ttl,
            consumed_at: None,
        }
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed_at.is_some()
    }

    /// Unused and not past its expiry at `now`.
    pub fn is_redeemable_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_consumed() && now <= self.expires_at
    }

    pub fn apply(&mut self, patch: &InvitePatch) {
        if let Some(hash) = &patch.token_hash {
            self.token_hash = hash.clone();
        }
        if let Some(expires_at) = patch.expires_at {
            self.expires_at = expires_at;
        }
        if let Some(consumed_at) = patch.consumed_at {
            self.consumed_at = consumed_at;
        }
    }
}

/// Partial update of an invite row. `consumed_at: Some(None)` clears the marker.
#[derive(Debug, Clone, Default)]
pub struct InvitePatch {
    pub token_hash: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub consumed_at: Option<Option<DateTime<Utc>>>,
}

impl InvitePatch {
    pub fn consumed(at: DateTime<Utc>) -> Self {
        Self {
            consumed_at: Some(Some(at)),
            ..Self::default()
        }
    }

    /// New secret and window; any previous consumption is cleared.
    pub fn reissued(token_hash: String, expires_at: DateTime<Utc>) -> Self {
        Self {
            token_hash: Some(token_hash),
            expires_at: Some(expires_at),
            consumed_at: Some(None),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.token_hash.is_none() && self.expires_at.is_none() && self.consumed_at.is_none()
    }
}
