use axum::{extract::State, Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::middleware::{RequestId, TenantId};

use super::{map_db_error, ApiError, ApiResponse, AppState, ResponseMeta};

/// Credentials view returned to clients. The access token itself never leaves
/// the server; only its presence is reported.
#[derive(Debug, Serialize)]
pub(super) struct SettingsItem {
    store_hash: String,
    client_id: String,
    access_token_set: bool,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub(super) struct PutSettingsRequest {
    store_hash: String,
    access_token: String,
    client_id: String,
}

impl From<cpilot_db::ApiSettingsRow> for SettingsItem {
    fn from(row: cpilot_db::ApiSettingsRow) -> Self {
        Self {
            store_hash: row.store_hash,
            client_id: row.client_id,
            access_token_set: !row.access_token.is_empty(),
            updated_at: row.updated_at,
        }
    }
}

pub(super) async fn get_settings(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(tenant): Extension<TenantId>,
) -> Result<Json<ApiResponse<SettingsItem>>, ApiError> {
    let row = cpilot_db::get_api_settings(&state.pool, tenant.0)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?
        .ok_or_else(|| {
            ApiError::new(
                req_id.0.clone(),
                "not_found",
                "BigCommerce credentials are not configured",
            )
        })?;

    Ok(Json(ApiResponse {
        data: row.into(),
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn put_settings(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(tenant): Extension<TenantId>,
    Json(body): Json<PutSettingsRequest>,
) -> Result<Json<ApiResponse<SettingsItem>>, ApiError> {
    let store_hash = body.store_hash.trim();
    let access_token = body.access_token.trim();
    let client_id = body.client_id.trim();

    if store_hash.is_empty() || access_token.is_empty() || client_id.is_empty() {
        return Err(ApiError::new(
            req_id.0,
            "validation_error",
            "store_hash, access_token and client_id are all required",
        ));
    }

    let row = cpilot_db::upsert_api_settings(&state.pool, tenant.0, store_hash, access_token, client_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    tracing::info!(user_id = tenant.0, store_hash, "BigCommerce credentials updated");

    Ok(Json(ApiResponse {
        data: row.into(),
        meta: ResponseMeta::new(req_id.0),
    }))
}
