use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;

use crate::{models::Identity, services::AuthError, AppState};

/// Verifies the bearer token and stores the resulting [`Identity`] in the
/// request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let identity = bearer_token(req.headers())
        .and_then(|token| state.jwt.verify(token))
        .inspect_err(|e| {
            metrics::counter!("admission_rejections_total", "stage" => "authenticate")
                .increment(1);
            tracing::info!(reason = %e, "Authentication failed");
        })?;

    tracing::debug!(subject_id = %identity.subject_id, role = %identity.role, "Authenticated");

    req.extensions_mut().insert(identity);

    Ok(next.run(req).await)
}

/// Exactly `Bearer <token>`; anything else is a format error.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingHeader)?
        .to_str()
        .map_err(|_| AuthError::MalformedHeader)?;

    if value.trim().is_empty() {
        return Err(AuthError::MissingHeader);
    }

    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Ok(token),
        _ => Err(AuthError::MalformedHeader),
    }
}

/// Extractor for the identity placed by [`auth_middleware`].
pub struct AuthUser(pub Identity);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let identity = parts.extensions.get::<Identity>().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "Identity missing from request extensions"
            ))
        })?;

        Ok(AuthUser(identity.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn extracts_bearer_token() {
        assert_eq!(bearer_token(&headers("Bearer abc.def.ghi")), Ok("abc.def.ghi"));
    }

    #[test]
    fn missing_or_blank_header() {
        assert_eq!(bearer_token(&HeaderMap::new()), Err(AuthError::MissingHeader));
        assert_eq!(bearer_token(&headers("")), Err(AuthError::MissingHeader));
    }

    #[test]
    fn wrong_scheme_or_shape() {
        for value in ["Basic abc", "Bearer", "Bearer ", "bearer abc", "Bearer a b"] {
            assert_eq!(
                bearer_token(&headers(value)),
                Err(AuthError::MalformedHeader),
                "{value}"
            );
        }
    }
}
