use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::{models::Identity, services::Admission};

/// One in-flight request per identity. The permit is held until the inner
/// service has produced its response.
pub async fn concurrency_gate_middleware(
    State(admission): State<Admission>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let subject_id = subject_of(&req)?;
    let _permit = admission.enter(subject_id).await?;

    Ok(next.run(req).await)
}

pub async fn rate_limit_middleware(
    State(admission): State<Admission>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    admission.check_rate(subject_of(&req)?)?;

    Ok(next.run(req).await)
}

pub(crate) fn subject_of(req: &Request) -> Result<Uuid, AppError> {
    req.extensions()
        .get::<Identity>()
        .map(|identity| identity.subject_id)
        .ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "Identity missing from request extensions"
            ))
        })
}
