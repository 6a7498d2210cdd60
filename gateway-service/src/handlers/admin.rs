//! Admin account handlers: sign-in, invites, activation, bootstrap.

use axum::{extract::State, http::StatusCode, Json};
use service_core::{error::AppError, response::ApiResponse};

use crate::{
    dtos::{
        admin::{BootstrapRequest, CreateAdminRequest, CreateUserRequest},
        auth::{ActivateRequest, InviteIssuedResponse, LoginRequest, LoginResponse, ResendInviteRequest},
    },
    middleware::AuthUser,
    models::{AccountKind, AccountResponse},
    services::{Activation, NewAdmin, NewUser},
    utils::{Password, ValidatedJson},
    AppState,
};

/// POST /v1/admin/auth/login
#[tracing::instrument(skip(state, req))]
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>, AppError> {
    let session = state
        .accounts
        .login(AccountKind::Admin, &req.email, Password::new(req.password))
        .await?;

    Ok(Json(ApiResponse::new(session.into(), "login successful")))
}

/// POST /v1/admin/auth/create
#[tracing::instrument(skip(state, actor, req))]
pub async fn create_admin(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ValidatedJson(req): ValidatedJson<CreateAdminRequest>,
) -> Result<(StatusCode, Json<ApiResponse<InviteIssuedResponse>>), AppError> {
    let issued = state
        .invites
        .create_admin(
            &actor,
            NewAdmin {
                name: req.name,
                email: req.email,
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(issued.into(), "admin invited")),
    ))
}

/// POST /v1/admin/auth/user
#[tracing::instrument(skip(state, actor, req))]
pub async fn create_user(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ValidatedJson(req): ValidatedJson<CreateUserRequest>,
) -> Result<(StatusCode, Json<ApiResponse<InviteIssuedResponse>>), AppError> {
    let issued = state
        .invites
        .create_user(
            &actor,
            NewUser {
                name: req.name,
                email: req.email,
                organization_id: req.organization_id,
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(issued.into(), "user invited")),
    ))
}

/// PATCH /v1/admin/auth/activate
pub async fn activate(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<ActivateRequest>,
) -> Result<Json<ApiResponse<AccountResponse>>, AppError> {
    activate_account(&state, AccountKind::Admin, req).await
}

/// POST /v1/admin/auth/resend-code
pub async fn resend_invite(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<ResendInviteRequest>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    resend_account_invite(&state, AccountKind::Admin, req).await
}

/// GET /v1/admin/auth/me
pub async fn me(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
) -> Result<Json<ApiResponse<AccountResponse>>, AppError> {
    let account = state.accounts.profile(&identity).await?;
    Ok(Json(ApiResponse::new(AccountResponse::from(&account), "ok")))
}

/// POST /v1/admin/bootstrap
#[tracing::instrument(skip(state, req))]
pub async fn bootstrap(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<BootstrapRequest>,
) -> Result<(StatusCode, Json<ApiResponse<LoginResponse>>), AppError> {
    let session = state
        .accounts
        .bootstrap(req.name, &req.email, Password::new(req.password))
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(session.into(), "super admin created")),
    ))
}

// ==================== Shared with user routes ====================

pub(crate) async fn activate_account(
    state: &AppState,
    kind: AccountKind,
    req: ActivateRequest,
) -> Result<Json<ApiResponse<AccountResponse>>, AppError> {
    let account = state
        .invites
        .activate(
            kind,
            Activation {
                token: req.token,
                password: Password::new(req.password),
                confirm_password: Password::new(req.confirm_password),
            },
        )
        .await?;

    Ok(Json(ApiResponse::new(
        AccountResponse::from(&account),
        "account activated",
    )))
}

pub(crate) async fn resend_account_invite(
    state: &AppState,
    kind: AccountKind,
    req: ResendInviteRequest,
) -> Result<Json<ApiResponse<()>>, AppError> {
    // Public route: confirm the send without echoing the account.
    state.invites.resend(kind, &req.email).await?;
    Ok(Json(ApiResponse::message("invite sent")))
}
