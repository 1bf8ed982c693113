use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::{RequestId, TenantId};

use super::{map_db_error, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Serialize)]
pub(super) struct TeamMemberItem {
    id: i64,
    email: String,
    display_name: Option<String>,
    role: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub(super) struct InvitationItem {
    id: i64,
    email: String,
    role: String,
    token: Uuid,
    status: String,
    created_at: DateTime<Utc>,
    accepted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub(super) struct CreateInvitationRequest {
    email: String,
    role: Option<String>,
}

impl From<cpilot_db::InvitationRow> for InvitationItem {
    fn from(row: cpilot_db::InvitationRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            role: row.role,
            token: row.token,
            status: row.status,
            created_at: row.created_at,
            accepted_at: row.accepted_at,
        }
    }
}

/// Resolves the tenant's company, erroring when the user has none.
async fn require_company(
    state: &AppState,
    req_id: &str,
    user_id: i64,
) -> Result<i64, ApiError> {
    let user = cpilot_db::get_user(&state.pool, user_id)
        .await
        .map_err(|e| map_db_error(req_id.to_owned(), &e))?
        .ok_or_else(|| ApiError::new(req_id.to_owned(), "not_found", "user not found"))?;

    user.company_id.ok_or_else(|| {
        ApiError::new(
            req_id.to_owned(),
            "conflict",
            "user does not belong to a company",
        )
    })
}

pub(super) async fn list_team(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(tenant): Extension<TenantId>,
) -> Result<Json<ApiResponse<Vec<TeamMemberItem>>>, ApiError> {
    let company_id = require_company(&state, &req_id.0, tenant.0).await?;

    let members = cpilot_db::list_team_members(&state.pool, company_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = members
        .into_iter()
        .map(|m| TeamMemberItem {
            id: m.id,
            email: m.email,
            display_name: m.display_name,
            role: m.role,
            created_at: m.created_at,
        })
        .collect();

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn list_invitations(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(tenant): Extension<TenantId>,
) -> Result<Json<ApiResponse<Vec<InvitationItem>>>, ApiError> {
    let company_id = require_company(&state, &req_id.0, tenant.0).await?;

    let rows = cpilot_db::list_invitations(&state.pool, company_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: rows.into_iter().map(InvitationItem::from).collect(),
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn create_invitation(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(tenant): Extension<TenantId>,
    Json(body): Json<CreateInvitationRequest>,
) -> Result<Json<ApiResponse<InvitationItem>>, ApiError> {
    let email = body.email.trim().to_ascii_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::new(
            req_id.0,
            "validation_error",
            "a valid email address is required",
        ));
    }
    let role = body.role.as_deref().map_or("member", str::trim);

    let company_id = require_company(&state, &req_id.0, tenant.0).await?;

    let row = cpilot_db::create_invitation(&state.pool, company_id, &email, role)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    tracing::info!(company_id, email = %row.email, "invitation created");

    Ok(Json(ApiResponse {
        data: row.into(),
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn accept_invitation(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(token): Path<Uuid>,
) -> Result<Json<ApiResponse<TeamMemberItem>>, ApiError> {
    let invitation = cpilot_db::get_invitation_by_token(&state.pool, token)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?
        .ok_or_else(|| ApiError::new(req_id.0.clone(), "not_found", "invitation not found"))?;

    // Guarded single-use transition; a second accept loses the race here.
    let accepted = cpilot_db::accept_invitation(&state.pool, token)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    if !accepted {
        return Err(ApiError::new(
            req_id.0,
            "conflict",
            "invitation has already been used or revoked",
        ));
    }

    let member = cpilot_db::attach_user_to_company(
        &state.pool,
        &invitation.email,
        None,
        invitation.company_id,
        &invitation.role,
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    tracing::info!(
        company_id = invitation.company_id,
        email = %member.email,
        "invitation accepted"
    );

    Ok(Json(ApiResponse {
        data: TeamMemberItem {
            id: member.id,
            email: member.email,
            display_name: member.display_name,
            role: member.role,
            created_at: member.created_at,
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}
