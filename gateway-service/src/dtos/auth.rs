use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::AccountResponse;
use crate::services::{InviteIssued, Session};

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub account: AccountResponse,
    pub token: String,
    pub token_type: &'static str,
    pub expires_at: DateTime<Utc>,
}

impl From<Session> for LoginResponse {
    fn from(session: Session) -> Self {
        Self {
            account: AccountResponse::from(&session.account),
            token: session.token.token,
            token_type: "Bearer",
            expires_at: session.token.expires_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct ActivateRequest {
    #[validate(length(min = 1, message = "token is required"))]
    pub token: String,

    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,

    #[validate(length(min = 1, message = "password confirmation is required"))]
    pub confirm_password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResendInviteRequest {
    #[validate(email(message = "invalid email format"))]
    pub email: String,
}

/// Returned to the inviting admin when an invite is issued. Never carries the
/// secret itself.
#[derive(Debug, Serialize)]
pub struct InviteIssuedResponse {
    pub account: AccountResponse,
    pub invite_expires_at: DateTime<Utc>,
}

impl From<InviteIssued> for InviteIssuedResponse {
    fn from(issued: InviteIssued) -> Self {
        Self {
            account: AccountResponse::from(&issued.account),
            invite_expires_at: issued.expires_at,
        }
    }
}
