//! Database operations for `api_settings` — per-tenant BigCommerce credentials.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `api_settings` table. One per tenant user, never versioned.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApiSettingsRow {
    pub id: i64,
    pub user_id: i64,
    pub store_hash: String,
    pub access_token: String,
    pub client_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Returns the tenant's BigCommerce credentials, if configured.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_api_settings(
    pool: &PgPool,
    user_id: i64,
) -> Result<Option<ApiSettingsRow>, DbError> {
    let row = sqlx::query_as::<_, ApiSettingsRow>(
        "SELECT id, user_id, store_hash, access_token, client_id, created_at, updated_at \
         FROM api_settings \
         WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Creates or overwrites the tenant's BigCommerce credentials.
///
/// Conflicts on `user_id` replace all credential fields and bump `updated_at`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_api_settings(
    pool: &PgPool,
    user_id: i64,
    store_hash: &str,
    access_token: &str,
    client_id: &str,
) -> Result<ApiSettingsRow, DbError> {
    let row = sqlx::query_as::<_, ApiSettingsRow>(
        "INSERT INTO api_settings (user_id, store_hash, access_token, client_id) \
         VALUES ($1, $2, $3, $4) \
         ON CONFLICT (user_id) DO UPDATE SET \
             store_hash   = EXCLUDED.store_hash, \
             access_token = EXCLUDED.access_token, \
             client_id    = EXCLUDED.client_id, \
             updated_at   = NOW() \
         RETURNING id, user_id, store_hash, access_token, client_id, created_at, updated_at",
    )
    .bind(user_id)
    .bind(store_hash)
    .bind(access_token)
    .bind(client_id)
    .fetch_one(pool)
    .await?;

    Ok(row)
}
