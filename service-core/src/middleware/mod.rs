pub mod metrics;
pub mod security_headers;
pub mod tracing;

pub use self::metrics::{install_prometheus_recorder, metrics_middleware};
pub use security_headers::security_headers_middleware;
pub use self::tracing::{REQUEST_ID_HEADER, RequestId, request_id_middleware};
