use std::str::FromStr;

use axum::{extract::State, Extension, Json};
use serde::{Deserialize, Serialize};

use cpilot_core::SubscriptionPlan;

use crate::middleware::{RequestId, TenantId};

use super::{map_db_error, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Serialize)]
pub(super) struct SubscriptionItem {
    plan: &'static str,
    product_limit: usize,
    product_count: i64,
    company: Option<CompanyItem>,
}

#[derive(Debug, Serialize)]
pub(super) struct CompanyItem {
    id: i64,
    name: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct UpdatePlanRequest {
    plan: String,
}

pub(super) async fn get_subscription(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(tenant): Extension<TenantId>,
) -> Result<Json<ApiResponse<SubscriptionItem>>, ApiError> {
    let user = cpilot_db::get_user(&state.pool, tenant.0)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?
        .ok_or_else(|| ApiError::new(req_id.0.clone(), "not_found", "user not found"))?;

    let company = match user.company_id {
        Some(company_id) => cpilot_db::get_company(&state.pool, company_id)
            .await
            .map_err(|e| map_db_error(req_id.0.clone(), &e))?,
        None => None,
    };

    // Users without a company stay on the trial plan.
    let plan = company
        .as_ref()
        .map_or(SubscriptionPlan::Trial, |c| SubscriptionPlan::from_db(&c.plan));

    let product_count = cpilot_db::count_products(&state.pool, tenant.0)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: SubscriptionItem {
            plan: plan.as_str(),
            product_limit: plan.product_limit(),
            product_count,
            company: company.map(|c| CompanyItem {
                id: c.id,
                name: c.name,
            }),
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn update_plan(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(tenant): Extension<TenantId>,
    Json(body): Json<UpdatePlanRequest>,
) -> Result<Json<ApiResponse<SubscriptionItem>>, ApiError> {
    let plan = SubscriptionPlan::from_str(body.plan.trim()).map_err(|_| {
        ApiError::new(
            req_id.0.clone(),
            "validation_error",
            "plan must be one of: trial, starter, premium",
        )
    })?;

    let user = cpilot_db::get_user(&state.pool, tenant.0)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?
        .ok_or_else(|| ApiError::new(req_id.0.clone(), "not_found", "user not found"))?;

    let Some(company_id) = user.company_id else {
        return Err(ApiError::new(
            req_id.0,
            "conflict",
            "user does not belong to a company",
        ));
    };

    let updated = cpilot_db::set_company_plan(&state.pool, company_id, plan.as_str())
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    if !updated {
        return Err(ApiError::new(req_id.0, "not_found", "company not found"));
    }

    tracing::info!(user_id = tenant.0, company_id, plan = plan.as_str(), "plan changed");

    let product_count = cpilot_db::count_products(&state.pool, tenant.0)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    let company = cpilot_db::get_company(&state.pool, company_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: SubscriptionItem {
            plan: plan.as_str(),
            product_limit: plan.product_limit(),
            product_count,
            company: company.map(|c| CompanyItem {
                id: c.id,
                name: c.name,
            }),
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}
