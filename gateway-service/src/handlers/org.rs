//! Organization handlers.
//!
//! Permission checks happen in the route guard; ownership (admin of
//! record or super admin) is checked here against the stored row.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use service_core::{error::AppError, response::ApiResponse};

use crate::{
    dtos::admin::{CreateOrganizationRequest, OrganizationQuery},
    middleware::AuthUser,
    models::{Identity, Organization},
    services::ServiceError,
    utils::{normalize_email, ValidatedJson},
    AppState,
};

/// POST /v1/admin/org
#[tracing::instrument(skip(state, actor, req), fields(actor = %actor.subject_id))]
pub async fn create_organization(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ValidatedJson(req): ValidatedJson<CreateOrganizationRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Organization>>), AppError> {
    let organization = Organization::new(
        req.name.trim().to_string(),
        normalize_email(&req.email),
        req.description,
        req.website,
        actor.subject_id,
    );

    state.store.insert_organization(&organization).await?;

    tracing::info!(organization_id = %organization.id, "Organization created");

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(organization, "organization created")),
    ))
}

/// GET /v1/admin/org?id=
pub async fn get_organization(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Query(query): Query<OrganizationQuery>,
) -> Result<Json<ApiResponse<Organization>>, AppError> {
    let organization = managed_organization(&state, &actor, &query).await?;
    Ok(Json(ApiResponse::new(organization, "ok")))
}

/// DELETE /v1/admin/org?id=
#[tracing::instrument(skip(state, actor, query), fields(actor = %actor.subject_id))]
pub async fn delete_organization(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Query(query): Query<OrganizationQuery>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    let organization = managed_organization(&state, &actor, &query).await?;

    state.store.delete_organization(organization.id).await?;

    tracing::info!(organization_id = %organization.id, "Organization deleted");

    Ok(Json(ApiResponse::message("organization deleted")))
}

async fn managed_organization(
    state: &AppState,
    actor: &Identity,
    query: &OrganizationQuery,
) -> Result<Organization, AppError> {
    let id = query.organization_id()?;

    let organization = state
        .store
        .find_organization(id)
        .await?
        .ok_or(ServiceError::OrganizationNotFound)?;

    if !actor.may_manage(&organization) {
        return Err(ServiceError::NotOrganizationAdmin.into());
    }

    Ok(organization)
}
