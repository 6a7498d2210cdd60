use axum::http::HeaderValue;
use axum::{extract::Request, middleware::Next, response::Response};
use tracing::Instrument;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Correlation id attached to request extensions by [`request_id_middleware`].
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Reuses the caller's `x-request-id` when it is a valid header value,
/// otherwise mints one. The id is echoed on the response and recorded on a
/// span wrapping the rest of the stack.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let (request_id, header_value) = match req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|h| h.to_str().ok().map(|s| (s.to_string(), h.clone())))
    {
        Some(existing) => existing,
        None => {
            let minted = Uuid::new_v4().to_string();
            match HeaderValue::from_str(&minted) {
                Ok(value) => (minted, value),
                Err(_) => return next.run(req).await,
            }
        }
    };

    req.headers_mut()
        .insert(REQUEST_ID_HEADER, header_value.clone());
    req.extensions_mut().insert(RequestId(request_id.clone()));

    let span = tracing::info_span!("request", request_id = %request_id);
    let mut response = next.run(req).instrument(span).await;

    response
        .headers_mut()
        .insert(REQUEST_ID_HEADER, header_value);

    response
}
