use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Bad request: {0}")]
    BadRequest(anyhow::Error),

    #[error("Unauthorized: {0}")]
    Unauthorized(anyhow::Error),

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Conflict: {0}")]
    Conflict(anyhow::Error),

    #[error("Too many requests: {0}")]
    TooManyRequests(String, Option<u64>),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        AppError::BadRequest(anyhow::anyhow!(message.into()))
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        AppError::Unauthorized(anyhow::anyhow!(message.into()))
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound(anyhow::anyhow!(message.into()))
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        AppError::Conflict(anyhow::anyhow!(message.into()))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::TooManyRequests(..) => StatusCode::TOO_MANY_REQUESTS,
            AppError::InternalError(_) | AppError::ConfigError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Machine-readable category placed in the `error` field of the envelope.
    pub fn category(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "validation_error",
            AppError::BadRequest(_) => "bad_request",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::TooManyRequests(..) => "too_many_requests",
            AppError::InternalError(_) | AppError::ConfigError(_) => "internal_error",
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

/// Flattens field errors into `field: message` pairs, sorted by field name.
fn describe_validation(errors: &validator::ValidationErrors) -> String {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(b.0));

    fields
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |err| match &err.message {
                Some(message) => format!("{}: {}", field, message),
                None => format!("{}: failed {} check", field, err.code),
            })
        })
        .collect::<Vec<_>>()
        .join("; ")
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: &'static str,
            message: String,
        }

        let status = self.status();
        let category = self.category();

        let (message, retry_after) = match self {
            AppError::ValidationError(err) => (describe_validation(&err), None),
            AppError::BadRequest(err)
            | AppError::Unauthorized(err)
            | AppError::NotFound(err)
            | AppError::Conflict(err) => (err.to_string(), None),
            AppError::TooManyRequests(msg, retry) => (msg, retry),
            AppError::InternalError(err) => {
                tracing::error!(error = ?err, "Internal server error");
                ("internal server error".to_string(), None)
            }
            AppError::ConfigError(err) => {
                tracing::error!(error = ?err, "Configuration error");
                ("internal server error".to_string(), None)
            }
        };

        let mut res = (
            status,
            Json(ErrorResponse {
                error: category,
                message,
            }),
        )
            .into_response();

        if let Some(retry) = retry_after {
            res.headers_mut()
                .insert(axum::http::header::RETRY_AFTER, retry.into());
        }

        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use validator::Validate;

    async fn body_json(res: Response) -> serde_json::Value {
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[derive(Validate)]
    struct Probe {
        #[validate(email(message = "must be a valid email"))]
        email: String,
    }

    #[tokio::test]
    async fn conflict_renders_envelope() {
        let res = AppError::conflict("account with email already exists").into_response();
        assert_eq!(res.status(), StatusCode::CONFLICT);

        let body = body_json(res).await;
        assert_eq!(body["error"], "conflict");
        assert_eq!(body["message"], "account with email already exists");
    }

    #[tokio::test]
    async fn too_many_requests_sets_retry_after() {
        let res = AppError::TooManyRequests("too many requests".into(), Some(2)).into_response();
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(res.headers()[axum::http::header::RETRY_AFTER], "2");
    }

    #[tokio::test]
    async fn internal_error_hides_details() {
        let res = AppError::InternalError(anyhow::anyhow!("connection refused")).into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(res).await;
        assert_eq!(body["error"], "internal_error");
        assert_eq!(body["message"], "internal server error");
    }

    #[tokio::test]
    async fn validation_errors_map_to_bad_request() {
        let err = Probe {
            email: "nope".into(),
        }
        .validate()
        .unwrap_err();

        let res = AppError::from(err).into_response();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let body = body_json(res).await;
        assert_eq!(body["error"], "validation_error");
        assert_eq!(body["message"], "email: must be a valid email");
    }
}
