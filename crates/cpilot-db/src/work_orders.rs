//! Database operations for `work_orders`.
//!
//! Status transitions are guarded UPDATEs (`WHERE status = $expected`) with
//! `rows_affected` checked, so concurrent triggers and restart replays cannot
//! move an order through the same transition twice.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;

use cpilot_core::{PriceSnapshot, ProductPriceUpdate};

use crate::DbError;

/// A row from the `work_orders` table.
///
/// `status` holds one of the [`cpilot_core::WorkOrderStatus`] string forms;
/// compare against `WorkOrderStatus::as_str()`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WorkOrderRow {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub product_updates: Json<Vec<ProductPriceUpdate>>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub execute_immediately: bool,
    pub status: String,
    pub original_prices: Option<Json<Vec<PriceSnapshot>>>,
    pub executed_at: Option<DateTime<Utc>>,
    pub undone_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
}

impl WorkOrderRow {
    #[must_use]
    pub fn updates(&self) -> &[ProductPriceUpdate] {
        &self.product_updates.0
    }

    #[must_use]
    pub fn snapshots(&self) -> Option<&[PriceSnapshot]> {
        self.original_prices.as_ref().map(|j| j.0.as_slice())
    }
}

/// Creates a new work order in `pending` status.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_work_order(
    pool: &PgPool,
    user_id: i64,
    title: &str,
    updates: &[ProductPriceUpdate],
    scheduled_at: Option<DateTime<Utc>>,
    execute_immediately: bool,
) -> Result<WorkOrderRow, DbError> {
    let row = sqlx::query_as::<_, WorkOrderRow>(
        "INSERT INTO work_orders \
             (user_id, title, product_updates, scheduled_at, execute_immediately) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING id, user_id, title, product_updates, scheduled_at, execute_immediately, \
                   status, original_prices, executed_at, undone_at, error_message, \
                   archived, created_at",
    )
    .bind(user_id)
    .bind(title)
    .bind(Json(updates))
    .bind(scheduled_at)
    .bind(execute_immediately)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Fetches a work order by ID across all tenants (scheduler use).
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_work_order(pool: &PgPool, id: i64) -> Result<Option<WorkOrderRow>, DbError> {
    let row = sqlx::query_as::<_, WorkOrderRow>(
        "SELECT id, user_id, title, product_updates, scheduled_at, execute_immediately, \
                status, original_prices, executed_at, undone_at, error_message, \
                archived, created_at \
         FROM work_orders \
         WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Fetches a work order by ID scoped to a tenant (route use).
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_work_order_for_user(
    pool: &PgPool,
    user_id: i64,
    id: i64,
) -> Result<Option<WorkOrderRow>, DbError> {
    let row = sqlx::query_as::<_, WorkOrderRow>(
        "SELECT id, user_id, title, product_updates, scheduled_at, execute_immediately, \
                status, original_prices, executed_at, undone_at, error_message, \
                archived, created_at \
         FROM work_orders \
         WHERE id = $1 AND user_id = $2",
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Lists a tenant's work orders, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_work_orders(
    pool: &PgPool,
    user_id: i64,
    include_archived: bool,
    limit: i64,
) -> Result<Vec<WorkOrderRow>, DbError> {
    let rows = sqlx::query_as::<_, WorkOrderRow>(
        "SELECT id, user_id, title, product_updates, scheduled_at, execute_immediately, \
                status, original_prices, executed_at, undone_at, error_message, \
                archived, created_at \
         FROM work_orders \
         WHERE user_id = $1 AND ($2 OR NOT archived) \
         ORDER BY created_at DESC, id DESC \
         LIMIT $3",
    )
    .bind(user_id)
    .bind(include_archived)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Lists all `pending` work orders across tenants, for startup recovery.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_pending_work_orders(pool: &PgPool) -> Result<Vec<WorkOrderRow>, DbError> {
    let rows = sqlx::query_as::<_, WorkOrderRow>(
        "SELECT id, user_id, title, product_updates, scheduled_at, execute_immediately, \
                status, original_prices, executed_at, undone_at, error_message, \
                archived, created_at \
         FROM work_orders \
         WHERE status = 'pending' \
         ORDER BY scheduled_at ASC NULLS FIRST, id ASC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Claims a work order for execution: `pending → executing`.
///
/// Returns `true` if this caller won the claim. `false` means the order was
/// already claimed, completed, or failed — the caller should skip execution
/// rather than treat it as an error.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn claim_work_order(pool: &PgPool, id: i64) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE work_orders \
         SET status = 'executing' \
         WHERE id = $1 AND status = 'pending'",
    )
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Marks a claimed order `completed`, persisting `executed_at` and the
/// captured price snapshots.
///
/// # Errors
///
/// Returns [`DbError::InvalidWorkOrderTransition`] if the order is not
/// `executing`, or [`DbError::Sqlx`] if the update fails.
pub async fn complete_work_order(
    pool: &PgPool,
    id: i64,
    snapshots: &[PriceSnapshot],
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE work_orders \
         SET status = 'completed', executed_at = NOW(), original_prices = $1 \
         WHERE id = $2 AND status = 'executing'",
    )
    .bind(Json(snapshots))
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidWorkOrderTransition {
            id,
            expected_status: "executing",
        });
    }

    Ok(())
}

/// Marks a claimed order `failed` with the error message persisted.
///
/// # Errors
///
/// Returns [`DbError::InvalidWorkOrderTransition`] if the order is not
/// `executing`, or [`DbError::Sqlx`] if the update fails.
pub async fn fail_work_order(pool: &PgPool, id: i64, error_message: &str) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE work_orders \
         SET status = 'failed', error_message = $1 \
         WHERE id = $2 AND status = 'executing'",
    )
    .bind(error_message)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidWorkOrderTransition {
            id,
            expected_status: "executing",
        });
    }

    Ok(())
}

/// Marks a completed order `undone` with `undone_at` set.
///
/// # Errors
///
/// Returns [`DbError::InvalidWorkOrderTransition`] if the order is not
/// `completed`, or [`DbError::Sqlx`] if the update fails.
pub async fn mark_work_order_undone(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE work_orders \
         SET status = 'undone', undone_at = NOW() \
         WHERE id = $1 AND status = 'completed'",
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidWorkOrderTransition {
            id,
            expected_status: "completed",
        });
    }

    Ok(())
}

/// Sets the archived flag on a tenant's work order.
///
/// Returns `true` if a row was updated.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn archive_work_order(pool: &PgPool, user_id: i64, id: i64) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE work_orders SET archived = TRUE WHERE id = $1 AND user_id = $2",
    )
    .bind(id)
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    async fn seed_user(pool: &PgPool, email: &str) -> i64 {
        sqlx::query_scalar::<_, i64>("INSERT INTO users (email) VALUES ($1) RETURNING id")
            .bind(email)
            .fetch_one(pool)
            .await
            .expect("seed user")
    }

    fn one_update() -> Vec<ProductPriceUpdate> {
        vec![ProductPriceUpdate {
            product_id: "100".to_string(),
            product_name: "Widget".to_string(),
            new_regular_price: Some(Decimal::new(1999, 2)),
            new_sale_price: None,
            variant_id: None,
            variant_sku: None,
        }]
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn create_returns_pending_row_with_updates(pool: PgPool) {
        let user_id = seed_user(&pool, "wo-create@example.com").await;
        let row = create_work_order(&pool, user_id, "Spring sale", &one_update(), None, true)
            .await
            .expect("create");

        assert_eq!(row.status, "pending");
        assert!(row.execute_immediately);
        assert_eq!(row.updates().len(), 1);
        assert_eq!(row.updates()[0].product_id, "100");
        assert!(row.snapshots().is_none());
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn claim_is_won_exactly_once(pool: PgPool) {
        let user_id = seed_user(&pool, "wo-claim@example.com").await;
        let row = create_work_order(&pool, user_id, "Claim me", &one_update(), None, true)
            .await
            .expect("create");

        assert!(claim_work_order(&pool, row.id).await.expect("first claim"));
        // A second trigger for the same order must be a no-op.
        assert!(!claim_work_order(&pool, row.id).await.expect("second claim"));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn complete_requires_executing_status(pool: PgPool) {
        let user_id = seed_user(&pool, "wo-complete@example.com").await;
        let row = create_work_order(&pool, user_id, "Complete me", &one_update(), None, true)
            .await
            .expect("create");

        // Still pending: completing must be rejected.
        let err = complete_work_order(&pool, row.id, &[]).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::InvalidWorkOrderTransition {
                expected_status: "executing",
                ..
            }
        ));

        assert!(claim_work_order(&pool, row.id).await.expect("claim"));
        let snapshots = vec![PriceSnapshot {
            product_id: "100".to_string(),
            variant_id: None,
            original_regular_price: Some(Decimal::new(2499, 2)),
            original_sale_price: None,
        }];
        complete_work_order(&pool, row.id, &snapshots)
            .await
            .expect("complete");

        let row = get_work_order(&pool, row.id).await.unwrap().unwrap();
        assert_eq!(row.status, "completed");
        assert!(row.executed_at.is_some());
        assert_eq!(row.snapshots().unwrap().len(), 1);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn undo_transition_requires_completed(pool: PgPool) {
        let user_id = seed_user(&pool, "wo-undo@example.com").await;
        let row = create_work_order(&pool, user_id, "Undo me", &one_update(), None, true)
            .await
            .expect("create");

        assert!(claim_work_order(&pool, row.id).await.unwrap());
        fail_work_order(&pool, row.id, "credentials missing")
            .await
            .expect("fail");

        let err = mark_work_order_undone(&pool, row.id).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::InvalidWorkOrderTransition {
                expected_status: "completed",
                ..
            }
        ));

        let row = get_work_order(&pool, row.id).await.unwrap().unwrap();
        assert_eq!(row.status, "failed");
        assert_eq!(row.error_message.as_deref(), Some("credentials missing"));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn list_excludes_archived_by_default(pool: PgPool) {
        let user_id = seed_user(&pool, "wo-archive@example.com").await;
        let keep = create_work_order(&pool, user_id, "Keep", &one_update(), None, false)
            .await
            .expect("create keep");
        let hide = create_work_order(&pool, user_id, "Hide", &one_update(), None, false)
            .await
            .expect("create hide");

        assert!(archive_work_order(&pool, user_id, hide.id).await.unwrap());

        let visible = list_work_orders(&pool, user_id, false, 50).await.unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, keep.id);

        let all = list_work_orders(&pool, user_id, true, 50).await.unwrap();
        assert_eq!(all.len(), 2);
    }
}
