mod categories;
mod products;
mod settings;
mod subscription;
mod sync;
mod team;
mod work_orders;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use cpilot_core::AppConfig;

use crate::middleware::{
    enforce_rate_limit, request_id, require_bearer_auth, resolve_tenant, AuthState,
    RateLimitState, RequestId,
};
use crate::scheduler::WorkOrderScheduler;
use crate::sync::SyncSessions;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub scheduler: WorkOrderScheduler,
    pub sync_sessions: SyncSessions,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "conflict" => StatusCode::CONFLICT,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            "upstream_error" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub(super) fn normalize_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(50).clamp(1, 200)
}

pub(super) fn map_db_error(request_id: String, error: &cpilot_db::DbError) -> ApiError {
    match error {
        cpilot_db::DbError::InvalidWorkOrderTransition {
            expected_status, ..
        } => ApiError::new(
            request_id,
            "conflict",
            format!("work order is not in the {expected_status} state"),
        ),
        _ => {
            tracing::error!(error = %error, "database query failed");
            ApiError::new(request_id, "internal_error", "database query failed")
        }
    }
}

pub(super) fn map_client_error(
    request_id: String,
    error: &cpilot_bigcommerce::BigCommerceError,
) -> ApiError {
    tracing::warn!(error = %error, "BigCommerce request failed");
    match error {
        cpilot_bigcommerce::BigCommerceError::RateLimited { .. } => {
            ApiError::new(request_id, "rate_limited", "store API rate limit reached")
        }
        _ => ApiError::new(request_id, "upstream_error", "store API request failed"),
    }
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
            HeaderName::from_static("x-user-id"),
        ])
}

fn protected_router(auth: AuthState, rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/settings",
            get(settings::get_settings).put(settings::put_settings),
        )
        .route("/api/v1/products", get(products::list_products))
        .route(
            "/api/v1/products/{source_product_id}/variants",
            get(products::list_product_variants),
        )
        .route("/api/v1/categories", get(categories::list_categories))
        .route("/api/v1/sync", post(sync::start_sync))
        .route("/api/v1/sync/cancel", post(sync::cancel_sync))
        .route(
            "/api/v1/work-orders",
            get(work_orders::list_work_orders).post(work_orders::create_work_order),
        )
        .route("/api/v1/work-orders/{id}", get(work_orders::get_work_order))
        .route(
            "/api/v1/work-orders/{id}/undo",
            post(work_orders::undo_work_order),
        )
        .route(
            "/api/v1/work-orders/{id}/archive",
            post(work_orders::archive_work_order),
        )
        .route(
            "/api/v1/subscription",
            get(subscription::get_subscription),
        )
        .route(
            "/api/v1/subscription/plan",
            put(subscription::update_plan),
        )
        .route("/api/v1/team", get(team::list_team))
        .route(
            "/api/v1/team/invitations",
            get(team::list_invitations).post(team::create_invitation),
        )
        .route(
            "/api/v1/team/invitations/{token}/accept",
            post(team::accept_invitation),
        )
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    rate_limit,
                    enforce_rate_limit,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    auth,
                    require_bearer_auth,
                ))
                .layer(axum::middleware::from_fn(resolve_tenant)),
        )
}

pub fn build_app(state: AppState, auth: AuthState, rate_limit: RateLimitState) -> Router {
    let public_routes = Router::new().route("/api/v1/health", get(health));

    Router::new()
        .merge(public_routes)
        .merge(protected_router(auth, rate_limit))
        .layer(
            ServiceBuilder::new()
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);

    match cpilot_db::health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "ok",
                },
                meta,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                    meta,
                }),
            )
        }
    }
}

pub fn default_rate_limit_state() -> RateLimitState {
    RateLimitState::new(120, Duration::from_secs(60))
}
