use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cpilot_core::{PriceSnapshot, ProductPriceUpdate};
use cpilot_db::WorkOrderRow;

use crate::middleware::{RequestId, TenantId};
use crate::scheduler::execute::{self, UndoError};

use super::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Serialize)]
pub(super) struct WorkOrderItem {
    id: i64,
    title: String,
    status: String,
    product_updates: Vec<ProductPriceUpdate>,
    scheduled_at: Option<DateTime<Utc>>,
    execute_immediately: bool,
    original_prices: Option<Vec<PriceSnapshot>>,
    executed_at: Option<DateTime<Utc>>,
    undone_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
    archived: bool,
    created_at: DateTime<Utc>,
}

impl From<WorkOrderRow> for WorkOrderItem {
    fn from(row: WorkOrderRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            status: row.status,
            product_updates: row.product_updates.0,
            scheduled_at: row.scheduled_at,
            execute_immediately: row.execute_immediately,
            original_prices: row.original_prices.map(|j| j.0),
            executed_at: row.executed_at,
            undone_at: row.undone_at,
            error_message: row.error_message,
            archived: row.archived,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct CreateWorkOrderRequest {
    title: String,
    product_updates: Vec<ProductPriceUpdate>,
    scheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    execute_immediately: bool,
}

#[derive(Debug, Deserialize)]
pub(super) struct WorkOrderQuery {
    #[serde(default)]
    include_archived: bool,
    limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct ArchiveResult {
    archived: bool,
}

fn validate_create(body: &CreateWorkOrderRequest) -> Result<(), &'static str> {
    if body.title.trim().is_empty() {
        return Err("title is required");
    }
    if body.product_updates.is_empty() {
        return Err("at least one product update is required");
    }
    if body
        .product_updates
        .iter()
        .any(|u| !u.has_price_change() || u.product_id.trim().is_empty())
    {
        return Err("every product update needs a product_id and at least one new price");
    }
    if !body.execute_immediately && body.scheduled_at.is_none() {
        return Err("either execute_immediately or scheduled_at is required");
    }
    Ok(())
}

pub(super) async fn create_work_order(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(tenant): Extension<TenantId>,
    Json(body): Json<CreateWorkOrderRequest>,
) -> Result<Json<ApiResponse<WorkOrderItem>>, ApiError> {
    validate_create(&body)
        .map_err(|message| ApiError::new(req_id.0.clone(), "validation_error", message))?;

    let row = cpilot_db::create_work_order(
        &state.pool,
        tenant.0,
        body.title.trim(),
        &body.product_updates,
        body.scheduled_at,
        body.execute_immediately,
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    state.scheduler.schedule(&row).await.map_err(|e| {
        tracing::error!(work_order_id = row.id, error = %e, "failed to schedule work order");
        ApiError::new(
            req_id.0.clone(),
            "internal_error",
            "work order created but could not be scheduled",
        )
    })?;

    tracing::info!(
        work_order_id = row.id,
        user_id = tenant.0,
        updates = row.updates().len(),
        "work order created"
    );

    Ok(Json(ApiResponse {
        data: row.into(),
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn list_work_orders(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(tenant): Extension<TenantId>,
    Query(query): Query<WorkOrderQuery>,
) -> Result<Json<ApiResponse<Vec<WorkOrderItem>>>, ApiError> {
    let rows = cpilot_db::list_work_orders(
        &state.pool,
        tenant.0,
        query.include_archived,
        normalize_limit(query.limit),
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: rows.into_iter().map(WorkOrderItem::from).collect(),
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn get_work_order(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(tenant): Extension<TenantId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<WorkOrderItem>>, ApiError> {
    let row = cpilot_db::get_work_order_for_user(&state.pool, tenant.0, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?
        .ok_or_else(|| ApiError::new(req_id.0.clone(), "not_found", "work order not found"))?;

    Ok(Json(ApiResponse {
        data: row.into(),
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn undo_work_order(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(tenant): Extension<TenantId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<WorkOrderItem>>, ApiError> {
    let row = execute::undo_work_order(&state.pool, &state.config, tenant.0, id)
        .await
        .map_err(|e| match e {
            UndoError::NotFound => {
                ApiError::new(req_id.0.clone(), "not_found", "work order not found")
            }
            UndoError::NotUndoable => ApiError::new(
                req_id.0.clone(),
                "conflict",
                "only completed work orders with captured prices can be undone",
            ),
            UndoError::MissingCredentials => ApiError::new(
                req_id.0.clone(),
                "validation_error",
                "BigCommerce credentials are not configured",
            ),
            UndoError::Db(db) => map_db_error(req_id.0.clone(), &db),
            UndoError::BigCommerce(e) => super::map_client_error(req_id.0.clone(), &e),
        })?;

    Ok(Json(ApiResponse {
        data: row.into(),
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn archive_work_order(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(tenant): Extension<TenantId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<ArchiveResult>>, ApiError> {
    let archived = cpilot_db::archive_work_order(&state.pool, tenant.0, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    if !archived {
        return Err(ApiError::new(
            req_id.0,
            "not_found",
            "work order not found",
        ));
    }

    // A pending order may still have a timer registered; drop it so the
    // archived order never fires.
    state.scheduler.unschedule(id).await;

    Ok(Json(ApiResponse {
        data: ArchiveResult { archived },
        meta: ResponseMeta::new(req_id.0),
    }))
}
