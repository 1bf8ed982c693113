//! Database operations for tenancy: `companies`, `users`, and `invitations`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `companies` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CompanyRow {
    pub id: i64,
    pub name: String,
    /// One of the `SubscriptionPlan` string forms; parse with
    /// `SubscriptionPlan::from_db`.
    pub plan: String,
    pub created_at: DateTime<Utc>,
}

/// A row from the `users` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: i64,
    pub email: String,
    pub display_name: Option<String>,
    pub company_id: Option<i64>,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

/// A row from the `invitations` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct InvitationRow {
    pub id: i64,
    pub company_id: i64,
    pub email: String,
    pub role: String,
    pub token: Uuid,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// companies operations
// ---------------------------------------------------------------------------

/// Creates a company on the given plan.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_company(pool: &PgPool, name: &str, plan: &str) -> Result<CompanyRow, DbError> {
    let row = sqlx::query_as::<_, CompanyRow>(
        "INSERT INTO companies (name, plan) VALUES ($1, $2) \
         RETURNING id, name, plan, created_at",
    )
    .bind(name)
    .bind(plan)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Fetches a company by ID.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_company(pool: &PgPool, id: i64) -> Result<Option<CompanyRow>, DbError> {
    let row = sqlx::query_as::<_, CompanyRow>(
        "SELECT id, name, plan, created_at FROM companies WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Changes a company's subscription plan.
///
/// Returns `true` if a row was updated.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn set_company_plan(pool: &PgPool, id: i64, plan: &str) -> Result<bool, DbError> {
    let result = sqlx::query("UPDATE companies SET plan = $1 WHERE id = $2")
        .bind(plan)
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

// ---------------------------------------------------------------------------
// users operations
// ---------------------------------------------------------------------------

/// Fetches a user by ID.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_user(pool: &PgPool, id: i64) -> Result<Option<UserRow>, DbError> {
    let row = sqlx::query_as::<_, UserRow>(
        "SELECT id, email, display_name, company_id, role, created_at \
         FROM users WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Creates a user.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails (including email conflicts).
pub async fn create_user(
    pool: &PgPool,
    email: &str,
    display_name: Option<&str>,
    company_id: Option<i64>,
    role: &str,
) -> Result<UserRow, DbError> {
    let row = sqlx::query_as::<_, UserRow>(
        "INSERT INTO users (email, display_name, company_id, role) \
         VALUES ($1, $2, $3, $4) \
         RETURNING id, email, display_name, company_id, role, created_at",
    )
    .bind(email)
    .bind(display_name)
    .bind(company_id)
    .bind(role)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Returns the plan string of the user's company, or `None` when the user has
/// no company (callers treat that as the trial plan).
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_user_plan(pool: &PgPool, user_id: i64) -> Result<Option<String>, DbError> {
    let plan = sqlx::query_scalar::<_, String>(
        "SELECT c.plan FROM users u JOIN companies c ON c.id = u.company_id WHERE u.id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(plan)
}

/// Lists the members of a company.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_team_members(pool: &PgPool, company_id: i64) -> Result<Vec<UserRow>, DbError> {
    let rows = sqlx::query_as::<_, UserRow>(
        "SELECT id, email, display_name, company_id, role, created_at \
         FROM users WHERE company_id = $1 \
         ORDER BY created_at ASC, id ASC",
    )
    .bind(company_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Joins a user to a company, creating the user row if the email is new.
///
/// Used when an invitation is accepted: conflicts on `email` update
/// `company_id` and `role` in place.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn attach_user_to_company(
    pool: &PgPool,
    email: &str,
    display_name: Option<&str>,
    company_id: i64,
    role: &str,
) -> Result<UserRow, DbError> {
    let row = sqlx::query_as::<_, UserRow>(
        "INSERT INTO users (email, display_name, company_id, role) \
         VALUES ($1, $2, $3, $4) \
         ON CONFLICT (email) DO UPDATE SET \
             company_id = EXCLUDED.company_id, \
             role       = EXCLUDED.role \
         RETURNING id, email, display_name, company_id, role, created_at",
    )
    .bind(email)
    .bind(display_name)
    .bind(company_id)
    .bind(role)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

// ---------------------------------------------------------------------------
// invitations operations
// ---------------------------------------------------------------------------

/// Creates a pending invitation with a freshly generated token.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_invitation(
    pool: &PgPool,
    company_id: i64,
    email: &str,
    role: &str,
) -> Result<InvitationRow, DbError> {
    let token = Uuid::new_v4();

    let row = sqlx::query_as::<_, InvitationRow>(
        "INSERT INTO invitations (company_id, email, role, token) \
         VALUES ($1, $2, $3, $4) \
         RETURNING id, company_id, email, role, token, status, created_at, accepted_at",
    )
    .bind(company_id)
    .bind(email)
    .bind(role)
    .bind(token)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Lists a company's invitations, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_invitations(
    pool: &PgPool,
    company_id: i64,
) -> Result<Vec<InvitationRow>, DbError> {
    let rows = sqlx::query_as::<_, InvitationRow>(
        "SELECT id, company_id, email, role, token, status, created_at, accepted_at \
         FROM invitations WHERE company_id = $1 \
         ORDER BY created_at DESC, id DESC",
    )
    .bind(company_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Fetches an invitation by its token.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_invitation_by_token(
    pool: &PgPool,
    token: Uuid,
) -> Result<Option<InvitationRow>, DbError> {
    let row = sqlx::query_as::<_, InvitationRow>(
        "SELECT id, company_id, email, role, token, status, created_at, accepted_at \
         FROM invitations WHERE token = $1",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Accepts a pending invitation: `pending → accepted` with `accepted_at` set.
///
/// Returns `true` if this call performed the transition; `false` means the
/// invitation was already accepted or revoked.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn accept_invitation(pool: &PgPool, token: Uuid) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE invitations \
         SET status = 'accepted', accepted_at = NOW() \
         WHERE token = $1 AND status = 'pending'",
    )
    .bind(token)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}
