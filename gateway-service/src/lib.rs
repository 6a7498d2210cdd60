pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    extract::State,
    http::{header, HeaderName, HeaderValue, Method, Request},
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, patch, post, MethodRouter},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use service_core::error::AppError;
use service_core::middleware::{
    metrics_middleware, request_id_middleware, security_headers_middleware, REQUEST_ID_HEADER,
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::config::GatewayConfig;
use crate::db::Store;
use crate::middleware::{
    admin_api_key_middleware, auth_middleware, concurrency_gate_middleware,
    rate_limit_middleware, require_permission,
};
use crate::models::{Permission, PermissionModel};
use crate::services::{AccountService, Admission, InviteService, Mailer, TokenCodec};
use crate::utils::SecretHasher;

#[derive(Clone)]
pub struct AppState {
    pub config: GatewayConfig,
    pub store: Arc<dyn Store>,
    pub jwt: TokenCodec,
    pub admission: Admission,
    pub invites: InviteService,
    pub accounts: AccountService,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Wires the services together. Everything here is built once per process.
    pub fn new(
        config: GatewayConfig,
        store: Arc<dyn Store>,
        mailer: Arc<dyn Mailer>,
        permissions: PermissionModel,
        metrics: Option<PrometheusHandle>,
    ) -> Result<Self, AppError> {
        let jwt = TokenCodec::new(&config.jwt, Arc::new(permissions)).map_err(AppError::ConfigError)?;
        let admission = Admission::new(&config.admission).map_err(AppError::ConfigError)?;
        let hasher =
            SecretHasher::new(config.invite.hash_key.as_bytes()).map_err(AppError::ConfigError)?;

        let invites = InviteService::new(
            store.clone(),
            mailer,
            hasher,
            chrono::Duration::hours(config.invite.ttl_hours),
        );
        let accounts = AccountService::new(store.clone(), jwt.clone());

        Ok(Self {
            config,
            store,
            jwt,
            admission,
            invites,
            accounts,
            metrics,
        })
    }
}

pub fn build_router(state: AppState) -> Result<Router, AppError> {
    // ==================== /v1/admin ====================
    let bootstrap_route = Router::new()
        .route("/bootstrap", post(handlers::admin::bootstrap))
        .route_layer(from_fn_with_state(state.clone(), admin_api_key_middleware));

    let admin_public = Router::new()
        .route("/auth/login", post(handlers::admin::login))
        .route("/auth/activate", patch(handlers::admin::activate))
        .route("/auth/resend-code", post(handlers::admin::resend_invite))
        .merge(bootstrap_route);

    let admin_protected = protect(
        Router::new()
            .route(
                "/auth/create",
                guarded(post(handlers::admin::create_admin), Permission::AdminCreate),
            )
            .route(
                "/auth/user",
                guarded(post(handlers::admin::create_user), Permission::UsersCreate),
            )
            .route(
                "/org",
                guarded(
                    post(handlers::org::create_organization),
                    Permission::OrganizationCreate,
                )
                .merge(guarded(
                    get(handlers::org::get_organization),
                    Permission::OrganizationView,
                ))
                .merge(guarded(
                    delete(handlers::org::delete_organization),
                    Permission::OrganizationDelete,
                )),
            )
            .route("/auth/me", get(handlers::admin::me)),
        &state,
    );

    // ==================== /v1/users ====================
    let users_public = Router::new()
        .route("/auth/login", post(handlers::user::login))
        .route("/auth/activate", patch(handlers::user::activate))
        .route("/auth/resend-code", post(handlers::user::resend_invite));

    let users_protected = protect(Router::new().route("/me", get(handlers::user::me)), &state);

    let cors = cors_layer(&state.config.security.allowed_origins)?;

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(handlers::metrics::metrics))
        .nest("/v1/admin", admin_public.merge(admin_protected))
        .nest("/v1/users", users_public.merge(users_protected))
        .fallback(route_not_found)
        .with_state(state)
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
            let request_id = request
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|value| value.to_str().ok())
                .unwrap_or("-");

            tracing::info_span!(
                "http_request",
                request_id = %request_id,
                method = %request.method(),
                uri = %request.uri(),
                version = ?request.version(),
            )
        }))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors);

    Ok(app)
}

/// Admission pipeline for protected routes. The last layer added runs
/// first: authenticate, then the concurrency gate, then the rate limit.
/// Per-route permission guards sit inside all three.
fn protect(router: Router<AppState>, state: &AppState) -> Router<AppState> {
    router
        .route_layer(from_fn_with_state(
            state.admission.clone(),
            rate_limit_middleware,
        ))
        .route_layer(from_fn_with_state(
            state.admission.clone(),
            concurrency_gate_middleware,
        ))
        .route_layer(from_fn_with_state(state.clone(), auth_middleware))
}

fn guarded(route: MethodRouter<AppState>, permission: Permission) -> MethodRouter<AppState> {
    route.route_layer(from_fn_with_state(permission, require_permission))
}

fn cors_layer(allowed_origins: &[String]) -> Result<CorsLayer, AppError> {
    let allow_origin = if allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let origins = allowed_origins
            .iter()
            .map(|o| {
                o.parse::<HeaderValue>().map_err(|e| {
                    AppError::ConfigError(anyhow::anyhow!("invalid CORS origin '{}': {}", o, e))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        AllowOrigin::list(origins)
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(middleware::admin::ADMIN_API_KEY_HEADER),
            HeaderName::from_static(REQUEST_ID_HEADER),
        ]))
}

async fn route_not_found() -> AppError {
    AppError::not_found("route not found")
}

/// Service health check
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.store.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Database health check failed");
        AppError::from(e)
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "database": "up"
        }
    })))
}
