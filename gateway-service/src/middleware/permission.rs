use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;

use crate::{
    models::{Identity, Permission},
    services::ServiceError,
};

/// Route guard: the caller's resolved permissions must contain `permission`.
pub async fn require_permission(
    State(permission): State<Permission>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let identity = req.extensions().get::<Identity>().ok_or_else(|| {
        AppError::InternalError(anyhow::anyhow!(
            "Identity missing from request extensions"
        ))
    })?;

    if !identity.has(permission) {
        tracing::warn!(
            subject_id = %identity.subject_id,
            role = %identity.role,
            required = %permission,
            "Missing permission"
        );
        metrics::counter!("admission_rejections_total", "stage" => "permission").increment(1);
        return Err(ServiceError::MissingPermission(permission).into());
    }

    Ok(next.run(req).await)
}
