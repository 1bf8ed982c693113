use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::middleware::{RequestId, TenantId};

use super::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Serialize)]
pub(super) struct ProductItem {
    id: i64,
    source_product_id: String,
    name: String,
    sku: Option<String>,
    regular_price: Option<Decimal>,
    sale_price: Option<Decimal>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub(super) struct VariantItem {
    id: i64,
    source_variant_id: String,
    sku: Option<String>,
    regular_price: Option<Decimal>,
    sale_price: Option<Decimal>,
}

#[derive(Debug, Serialize)]
pub(super) struct ProductPage {
    items: Vec<ProductItem>,
    total: i64,
}

#[derive(Debug, Deserialize)]
pub(super) struct ProductQuery {
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub(super) async fn list_products(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(tenant): Extension<TenantId>,
    Query(query): Query<ProductQuery>,
) -> Result<Json<ApiResponse<ProductPage>>, ApiError> {
    let rows = cpilot_db::list_products(
        &state.pool,
        tenant.0,
        cpilot_db::ProductListFilters {
            search: query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()),
            limit: Some(normalize_limit(query.limit)),
            offset: Some(query.offset.unwrap_or(0).max(0)),
        },
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let total = cpilot_db::count_products(&state.pool, tenant.0)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let items = rows
        .into_iter()
        .map(|row| ProductItem {
            id: row.id,
            source_product_id: row.source_product_id,
            name: row.name,
            sku: row.sku,
            regular_price: row.regular_price,
            sale_price: row.sale_price,
            updated_at: row.updated_at,
        })
        .collect();

    Ok(Json(ApiResponse {
        data: ProductPage { items, total },
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn list_product_variants(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(tenant): Extension<TenantId>,
    Path(source_product_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<VariantItem>>>, ApiError> {
    let product = cpilot_db::get_product_by_source_id(&state.pool, tenant.0, &source_product_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?
        .ok_or_else(|| ApiError::new(req_id.0.clone(), "not_found", "product not found"))?;

    let rows = cpilot_db::list_variants(&state.pool, product.id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = rows
        .into_iter()
        .map(|row| VariantItem {
            id: row.id,
            source_variant_id: row.source_variant_id,
            sku: row.sku,
            regular_price: row.regular_price,
            sale_price: row.sale_price,
        })
        .collect();

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}
