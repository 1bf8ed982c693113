use axum::{extract::State, Extension, Json};
use serde::Serialize;

use cpilot_bigcommerce::{BigCommerceClient, Credentials, HttpSettings};

use crate::middleware::{RequestId, TenantId};

use super::{map_client_error, map_db_error, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Serialize)]
pub(super) struct CategoryItem {
    id: i64,
    parent_id: i64,
    name: String,
}

/// Live proxy to the store's category list; categories are not mirrored
/// locally.
pub(super) async fn list_categories(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(tenant): Extension<TenantId>,
) -> Result<Json<ApiResponse<Vec<CategoryItem>>>, ApiError> {
    let settings = cpilot_db::get_api_settings(&state.pool, tenant.0)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?
        .ok_or_else(|| {
            ApiError::new(
                req_id.0.clone(),
                "validation_error",
                "BigCommerce credentials are not configured",
            )
        })?;

    let client = BigCommerceClient::new(
        &HttpSettings::from_app_config(&state.config),
        Credentials {
            store_hash: settings.store_hash,
            access_token: settings.access_token,
            client_id: settings.client_id,
        },
    )
    .map_err(|e| map_client_error(req_id.0.clone(), &e))?;

    let categories = client
        .fetch_categories()
        .await
        .map_err(|e| map_client_error(req_id.0.clone(), &e))?;

    let data = categories
        .into_iter()
        .map(|c| CategoryItem {
            id: c.id,
            parent_id: c.parent_id,
            name: c.name,
        })
        .collect();

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}
