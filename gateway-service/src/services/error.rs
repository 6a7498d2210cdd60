use service_core::error::AppError;
use thiserror::Error;

use crate::db::StoreError;
use crate::models::Permission;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("account is not yet activated")]
    AccountNotActivated,

    #[error("account is already active")]
    AccountAlreadyActive,

    #[error("account does not exist")]
    AccountNotFound,

    #[error("account does not have an invite")]
    InviteNotFound,

    #[error("organization does not exist")]
    OrganizationNotFound,

    #[error("invalid or expired invite")]
    InvalidInvite,

    #[error("passwords do not match")]
    PasswordMismatch,

    #[error("forbidden: missing permission {0}")]
    MissingPermission(Permission),

    #[error("forbidden: not the organization's admin")]
    NotOrganizationAdmin,

    #[error("a super admin already exists")]
    SuperAdminExists,
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Store(e) => e.into(),
            ServiceError::Internal(e) => AppError::InternalError(e),
            e @ (ServiceError::InvalidCredentials
            | ServiceError::MissingPermission(_)
            | ServiceError::NotOrganizationAdmin) => AppError::unauthorized(e.to_string()),
            e @ (ServiceError::AccountNotActivated
            | ServiceError::InvalidInvite
            | ServiceError::PasswordMismatch) => AppError::bad_request(e.to_string()),
            e @ (ServiceError::AccountNotFound
            | ServiceError::InviteNotFound
            | ServiceError::OrganizationNotFound) => AppError::not_found(e.to_string()),
            e @ (ServiceError::AccountAlreadyActive | ServiceError::SuperAdminExists) => {
                AppError::conflict(e.to_string())
            }
        }
    }
}
