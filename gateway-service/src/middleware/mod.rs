pub mod admin;
pub mod admission;
pub mod auth;
pub mod permission;

pub use admin::admin_api_key_middleware;
pub use admission::{concurrency_gate_middleware, rate_limit_middleware};
pub use auth::{auth_middleware, bearer_token, AuthUser};
pub use permission::require_permission;
