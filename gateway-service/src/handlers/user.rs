use axum::{extract::State, Json};
use service_core::{error::AppError, response::ApiResponse};

use super::admin::{activate_account, resend_account_invite};
use crate::{
    dtos::auth::{ActivateRequest, LoginRequest, LoginResponse, ResendInviteRequest},
    middleware::AuthUser,
    models::{AccountKind, AccountResponse},
    utils::{Password, ValidatedJson},
    AppState,
};

/// POST /v1/users/auth/login
#[tracing::instrument(skip(state, req))]
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>, AppError> {
    let session = state
        .accounts
        .login(AccountKind::User, &req.email, Password::new(req.password))
        .await?;

    Ok(Json(ApiResponse::new(session.into(), "login successful")))
}

/// PATCH /v1/users/auth/activate
pub async fn activate(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<ActivateRequest>,
) -> Result<Json<ApiResponse<AccountResponse>>, AppError> {
    activate_account(&state, AccountKind::User, req).await
}

/// POST /v1/users/auth/resend-code
pub async fn resend_invite(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<ResendInviteRequest>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    resend_account_invite(&state, AccountKind::User, req).await
}

/// GET /v1/users/me
pub async fn me(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
) -> Result<Json<ApiResponse<AccountResponse>>, AppError> {
    let account = state.accounts.profile(&identity).await?;
    Ok(Json(ApiResponse::new(AccountResponse::from(&account), "ok")))
}
