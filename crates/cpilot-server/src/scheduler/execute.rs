//! Work-order execution and undo.
//!
//! Execution is best-effort per item: a failing product update is logged and
//! skipped, and the batch continues. Only a missing claim or missing
//! credentials abort the whole order. Undo replays the captured snapshots,
//! matching each update to its snapshot by `(product_id, variant_id)`.

use std::time::Duration;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::PgPool;
use thiserror::Error;

use cpilot_bigcommerce::{BigCommerceClient, Credentials, HttpSettings, PriceUpdate};
use cpilot_core::{AppConfig, PriceSnapshot, ProductPriceUpdate, WorkOrderStatus};
use cpilot_db::{ApiSettingsRow, DbError, WorkOrderRow};

#[derive(Debug, Error)]
pub enum UndoError {
    #[error("work order not found")]
    NotFound,

    #[error("work order is not completed or has no price snapshots")]
    NotUndoable,

    #[error("BigCommerce credentials are not configured")]
    MissingCredentials,

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    BigCommerce(#[from] cpilot_bigcommerce::BigCommerceError),
}

/// Executes a work order end to end. Never returns an error: every failure
/// path either records `failed` on the order or is logged and skipped, since
/// this runs detached inside scheduler jobs.
pub async fn run_work_order(pool: &PgPool, config: &AppConfig, order_id: i64) {
    match cpilot_db::claim_work_order(pool, order_id).await {
        Ok(true) => {}
        Ok(false) => {
            tracing::info!(
                work_order_id = order_id,
                "claim missed; order already executed or no longer pending"
            );
            return;
        }
        Err(e) => {
            tracing::error!(work_order_id = order_id, error = %e, "failed to claim work order");
            return;
        }
    }

    let order = match cpilot_db::get_work_order(pool, order_id).await {
        Ok(Some(order)) => order,
        Ok(None) => {
            tracing::error!(work_order_id = order_id, "claimed order disappeared");
            return;
        }
        Err(e) => {
            tracing::error!(work_order_id = order_id, error = %e, "failed to load work order");
            fail_and_log(pool, order_id, "failed to load work order").await;
            return;
        }
    };

    let client = match build_client(pool, config, order.user_id).await {
        Ok(Some(client)) => client,
        Ok(None) => {
            fail_and_log(pool, order_id, "BigCommerce credentials are not configured").await;
            return;
        }
        Err(e) => {
            fail_and_log(pool, order_id, &e.to_string()).await;
            return;
        }
    };

    let mut snapshots: Vec<PriceSnapshot> = Vec::with_capacity(order.updates().len());

    for (index, update) in order.updates().iter().enumerate() {
        if index > 0 && config.work_order_inter_update_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(config.work_order_inter_update_delay_ms))
                .await;
        }

        match apply_update(pool, &client, order.user_id, update).await {
            Ok(Some(snapshot)) => snapshots.push(snapshot),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(
                    work_order_id = order_id,
                    product_id = %update.product_id,
                    error = %e,
                    "product update failed; skipping item"
                );
            }
        }
    }

    match cpilot_db::complete_work_order(pool, order_id, &snapshots).await {
        Ok(()) => {
            tracing::info!(
                work_order_id = order_id,
                updates = order.updates().len(),
                snapshots = snapshots.len(),
                "work order completed"
            );
        }
        Err(e) => {
            tracing::error!(work_order_id = order_id, error = %e, "failed to complete work order");
        }
    }
}

/// Reverts a completed work order to its captured snapshots.
///
/// Per-item failures are logged and skipped like execution; the order still
/// moves to `undone` so a partially failed undo is visible in the item logs
/// rather than leaving the order re-undoable.
///
/// # Errors
///
/// - [`UndoError::NotFound`] — no such order for this tenant.
/// - [`UndoError::NotUndoable`] — status is not `completed` or no snapshots
///   were captured.
/// - [`UndoError::MissingCredentials`] — the tenant has no `api_settings`.
/// - [`UndoError::Db`] — a database read or the final transition failed.
pub async fn undo_work_order(
    pool: &PgPool,
    config: &AppConfig,
    user_id: i64,
    order_id: i64,
) -> Result<WorkOrderRow, UndoError> {
    let order = cpilot_db::get_work_order_for_user(pool, user_id, order_id)
        .await?
        .ok_or(UndoError::NotFound)?;

    let snapshots = match order.snapshots() {
        Some(snapshots)
            if order.status == WorkOrderStatus::Completed.as_str() && !snapshots.is_empty() =>
        {
            snapshots
        }
        _ => return Err(UndoError::NotUndoable),
    };

    let client = build_client(pool, config, user_id)
        .await?
        .ok_or(UndoError::MissingCredentials)?;

    for update in order.updates() {
        let Some(snapshot) = PriceSnapshot::find_for(snapshots, update) else {
            // No snapshot means the product was missing locally at execution
            // time; nothing was changed, nothing to revert.
            continue;
        };

        if let Err(e) = restore_snapshot(pool, &client, user_id, snapshot).await {
            tracing::warn!(
                work_order_id = order_id,
                product_id = %snapshot.product_id,
                error = %e,
                "snapshot restore failed; skipping item"
            );
        }
    }

    cpilot_db::mark_work_order_undone(pool, order_id).await?;
    let row = cpilot_db::get_work_order_for_user(pool, user_id, order_id)
        .await?
        .ok_or(UndoError::NotFound)?;

    tracing::info!(work_order_id = order_id, user_id, "work order undone");
    Ok(row)
}

/// Applies one price update upstream and to the local mirror.
///
/// Returns the captured snapshot, or `None` when the target does not exist in
/// the mirror (no snapshot, no upstream call).
async fn apply_update(
    pool: &PgPool,
    client: &BigCommerceClient,
    user_id: i64,
    update: &ProductPriceUpdate,
) -> Result<Option<PriceSnapshot>, UndoError> {
    if !update.has_price_change() {
        tracing::warn!(product_id = %update.product_id, "update carries no price change; skipping");
        return Ok(None);
    }

    let product_id: i64 = match update.product_id.parse() {
        Ok(id) => id,
        Err(_) => {
            tracing::warn!(product_id = %update.product_id, "non-numeric product id; skipping");
            return Ok(None);
        }
    };

    let current = match &update.variant_id {
        Some(variant_id) => {
            cpilot_db::get_variant_prices(pool, user_id, &update.product_id, variant_id).await?
        }
        None => cpilot_db::get_product_prices(pool, user_id, &update.product_id).await?,
    };

    let Some(current) = current else {
        tracing::warn!(
            product_id = %update.product_id,
            variant_id = update.variant_id.as_deref(),
            "target not found in local mirror; skipping"
        );
        return Ok(None);
    };

    let snapshot = PriceSnapshot {
        product_id: update.product_id.clone(),
        variant_id: update.variant_id.clone(),
        original_regular_price: current.regular_price,
        original_sale_price: current.sale_price,
    };

    // Only the requested fields go upstream; BigCommerce leaves the rest
    // untouched (partial-update semantics).
    let body = PriceUpdate {
        price: update.new_regular_price.as_ref().and_then(Decimal::to_f64),
        sale_price: update.new_sale_price.as_ref().and_then(Decimal::to_f64),
    };

    match &update.variant_id {
        Some(variant_id) => {
            let variant_id: i64 = match variant_id.parse() {
                Ok(id) => id,
                Err(_) => {
                    tracing::warn!(variant_id = %variant_id, "non-numeric variant id; skipping");
                    return Ok(None);
                }
            };
            client
                .update_variant_price(product_id, variant_id, body)
                .await?;
        }
        None => client.update_product_price(product_id, body).await?,
    }

    // Mirror the merged result: requested fields take the new value, the
    // other field keeps what the snapshot captured.
    let regular = update.new_regular_price.or(snapshot.original_regular_price);
    let sale = update.new_sale_price.or(snapshot.original_sale_price);

    let mirrored = match &update.variant_id {
        Some(variant_id) => {
            cpilot_db::set_variant_prices(pool, user_id, &update.product_id, variant_id, regular, sale)
                .await?
        }
        None => {
            cpilot_db::set_product_prices(pool, user_id, &update.product_id, regular, sale).await?
        }
    };

    if !mirrored {
        tracing::warn!(product_id = %update.product_id, "mirror row vanished mid-execution");
    }

    Ok(Some(snapshot))
}

/// Writes one snapshot back upstream and into the mirror.
async fn restore_snapshot(
    pool: &PgPool,
    client: &BigCommerceClient,
    user_id: i64,
    snapshot: &PriceSnapshot,
) -> Result<(), UndoError> {
    let product_id: i64 = snapshot
        .product_id
        .parse()
        .map_err(|_| UndoError::NotFound)?;

    let body = PriceUpdate {
        price: snapshot
            .original_regular_price
            .as_ref()
            .and_then(Decimal::to_f64),
        sale_price: snapshot
            .original_sale_price
            .as_ref()
            .and_then(Decimal::to_f64),
    };

    match &snapshot.variant_id {
        Some(variant_id) => {
            let variant_id: i64 = variant_id.parse().map_err(|_| UndoError::NotFound)?;
            client
                .update_variant_price(product_id, variant_id, body)
                .await?;
            cpilot_db::set_variant_prices(
                pool,
                user_id,
                &snapshot.product_id,
                &variant_id.to_string(),
                snapshot.original_regular_price,
                snapshot.original_sale_price,
            )
            .await?;
        }
        None => {
            client.update_product_price(product_id, body).await?;
            cpilot_db::set_product_prices(
                pool,
                user_id,
                &snapshot.product_id,
                snapshot.original_regular_price,
                snapshot.original_sale_price,
            )
            .await?;
        }
    }

    Ok(())
}

/// Loads the tenant's credentials and builds a client, or `Ok(None)` when no
/// credentials are configured.
async fn build_client(
    pool: &PgPool,
    config: &AppConfig,
    user_id: i64,
) -> Result<Option<BigCommerceClient>, UndoError> {
    let settings: Option<ApiSettingsRow> = cpilot_db::get_api_settings(pool, user_id).await?;

    let Some(settings) = settings else {
        return Ok(None);
    };

    let client = BigCommerceClient::new(
        &HttpSettings::from_app_config(config),
        Credentials {
            store_hash: settings.store_hash,
            access_token: settings.access_token,
            client_id: settings.client_id,
        },
    )?;

    Ok(Some(client))
}

async fn fail_and_log(pool: &PgPool, order_id: i64, message: &str) {
    tracing::error!(work_order_id = order_id, message, "work order failed");
    if let Err(e) = cpilot_db::fail_work_order(pool, order_id, message).await {
        tracing::error!(work_order_id = order_id, error = %e, "failed to record order failure");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpilot_core::catalog::{SyncedProduct, SyncedVariant};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const STORE_HASH: &str = "wo-store";

    fn test_config(api_base: &str) -> AppConfig {
        AppConfig {
            database_url: "postgres://unused".to_owned(),
            env: cpilot_core::Environment::Development,
            bind_addr: "127.0.0.1:0".parse().expect("addr"),
            log_level: "info".to_owned(),
            db_max_connections: 5,
            db_min_connections: 0,
            db_acquire_timeout_secs: 5,
            bigcommerce_api_base: api_base.to_owned(),
            bigcommerce_request_timeout_secs: 5,
            bigcommerce_max_retries: 0,
            bigcommerce_retry_backoff_base_secs: 0,
            sync_page_size: 50,
            sync_inter_page_delay_ms: 0,
            work_order_inter_update_delay_ms: 0,
        }
    }

    async fn seed_tenant(pool: &PgPool, email: &str) -> i64 {
        let user_id =
            sqlx::query_scalar::<_, i64>("INSERT INTO users (email) VALUES ($1) RETURNING id")
                .bind(email)
                .fetch_one(pool)
                .await
                .expect("seed user");
        cpilot_db::upsert_api_settings(pool, user_id, STORE_HASH, "token", "client")
            .await
            .expect("seed settings");
        user_id
    }

    async fn seed_mirror(pool: &PgPool, user_id: i64) {
        let products = vec![SyncedProduct {
            source_product_id: "101".to_owned(),
            name: "Widget".to_owned(),
            sku: Some("WID-1".to_owned()),
            regular_price: Some(19.99),
            sale_price: Some(14.99),
            variants: vec![SyncedVariant {
                source_variant_id: "501".to_owned(),
                sku: Some("WID-1-S".to_owned()),
                regular_price: Some(19.99),
                sale_price: None,
            }],
        }];
        cpilot_db::replace_products(pool, user_id, &products)
            .await
            .expect("seed mirror");
    }

    async fn mount_put_ok(server: &MockServer, suffix: &str) {
        Mock::given(method("PUT"))
            .and(path(format!(
                "/stores/{STORE_HASH}/v3/catalog/products{suffix}"
            )))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(&json!({ "data": {}, "meta": {} })),
            )
            .mount(server)
            .await;
    }

    fn price_update(regular: &str) -> ProductPriceUpdate {
        ProductPriceUpdate {
            product_id: "101".to_owned(),
            product_name: "Widget".to_owned(),
            new_regular_price: Some(regular.parse().expect("decimal")),
            new_sale_price: None,
            variant_id: None,
            variant_sku: None,
        }
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn execute_captures_snapshot_and_mirrors_prices(pool: PgPool) {
        let server = MockServer::start().await;
        mount_put_ok(&server, "/101").await;

        let user_id = seed_tenant(&pool, "exec-basic@example.com").await;
        seed_mirror(&pool, user_id).await;
        let order = cpilot_db::create_work_order(
            &pool,
            user_id,
            "Raise widget",
            &[price_update("24.99")],
            None,
            true,
        )
        .await
        .expect("create order");

        run_work_order(&pool, &test_config(&server.uri()), order.id).await;

        let row = cpilot_db::get_work_order(&pool, order.id)
            .await
            .expect("load")
            .expect("exists");
        assert_eq!(row.status, "completed");
        assert!(row.executed_at.is_some());

        let snapshots = row.snapshots().expect("snapshots persisted");
        assert_eq!(snapshots.len(), 1);
        assert_eq!(
            snapshots[0].original_regular_price,
            Some("19.99".parse().expect("decimal"))
        );

        let mirror = cpilot_db::get_product_prices(&pool, user_id, "101")
            .await
            .expect("read mirror")
            .expect("mirror row");
        assert_eq!(mirror.regular_price, Some("24.99".parse().expect("decimal")));
        // Untouched field keeps its prior value.
        assert_eq!(mirror.sale_price, Some("14.99".parse().expect("decimal")));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn missing_mirror_row_is_skipped_without_snapshot(pool: PgPool) {
        let server = MockServer::start().await;

        let user_id = seed_tenant(&pool, "exec-missing@example.com").await;
        // Mirror intentionally left empty; no upstream call expected.
        let order = cpilot_db::create_work_order(
            &pool,
            user_id,
            "Ghost product",
            &[price_update("24.99")],
            None,
            true,
        )
        .await
        .expect("create order");

        run_work_order(&pool, &test_config(&server.uri()), order.id).await;

        let row = cpilot_db::get_work_order(&pool, order.id)
            .await
            .expect("load")
            .expect("exists");
        assert_eq!(row.status, "completed");
        assert_eq!(row.snapshots().map(<[PriceSnapshot]>::len), Some(0));
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn missing_credentials_fail_the_order(pool: PgPool) {
        let user_id =
            sqlx::query_scalar::<_, i64>("INSERT INTO users (email) VALUES ($1) RETURNING id")
                .bind("exec-nocreds@example.com")
                .fetch_one(&pool)
                .await
                .expect("seed user");
        let order = cpilot_db::create_work_order(
            &pool,
            user_id,
            "No creds",
            &[price_update("24.99")],
            None,
            true,
        )
        .await
        .expect("create order");

        run_work_order(&pool, &test_config("http://127.0.0.1:9"), order.id).await;

        let row = cpilot_db::get_work_order(&pool, order.id)
            .await
            .expect("load")
            .expect("exists");
        assert_eq!(row.status, "failed");
        assert!(row
            .error_message
            .as_deref()
            .is_some_and(|m| m.contains("credentials")));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn apply_then_undo_restores_the_mirror(pool: PgPool) {
        let server = MockServer::start().await;
        mount_put_ok(&server, "/101").await;

        let user_id = seed_tenant(&pool, "exec-undo@example.com").await;
        seed_mirror(&pool, user_id).await;
        let order = cpilot_db::create_work_order(
            &pool,
            user_id,
            "Raise then revert",
            &[price_update("29.99")],
            None,
            true,
        )
        .await
        .expect("create order");

        let config = test_config(&server.uri());
        run_work_order(&pool, &config, order.id).await;

        let raised = cpilot_db::get_product_prices(&pool, user_id, "101")
            .await
            .expect("read mirror")
            .expect("mirror row");
        assert_eq!(raised.regular_price, Some("29.99".parse().expect("decimal")));

        let undone = undo_work_order(&pool, &config, user_id, order.id)
            .await
            .expect("undo");
        assert_eq!(undone.status, "undone");
        assert!(undone.undone_at.is_some());

        let restored = cpilot_db::get_product_prices(&pool, user_id, "101")
            .await
            .expect("read mirror")
            .expect("mirror row");
        assert_eq!(
            restored.regular_price,
            Some("19.99".parse().expect("decimal"))
        );
        assert_eq!(restored.sale_price, Some("14.99".parse().expect("decimal")));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn undo_rejects_non_completed_orders(pool: PgPool) {
        let user_id = seed_tenant(&pool, "exec-undo-pending@example.com").await;
        let order = cpilot_db::create_work_order(
            &pool,
            user_id,
            "Still pending",
            &[price_update("24.99")],
            None,
            false,
        )
        .await
        .expect("create order");

        let result =
            undo_work_order(&pool, &test_config("http://127.0.0.1:9"), user_id, order.id).await;
        assert!(matches!(result, Err(UndoError::NotUndoable)));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn variant_update_targets_the_variant(pool: PgPool) {
        let server = MockServer::start().await;
        mount_put_ok(&server, "/101/variants/501").await;

        let user_id = seed_tenant(&pool, "exec-variant@example.com").await;
        seed_mirror(&pool, user_id).await;
        let update = ProductPriceUpdate {
            product_id: "101".to_owned(),
            product_name: "Widget".to_owned(),
            new_regular_price: Some("9.99".parse().expect("decimal")),
            new_sale_price: None,
            variant_id: Some("501".to_owned()),
            variant_sku: Some("WID-1-S".to_owned()),
        };
        let order = cpilot_db::create_work_order(
            &pool,
            user_id,
            "Variant tweak",
            &[update],
            None,
            true,
        )
        .await
        .expect("create order");

        let config = test_config(&server.uri());
        run_work_order(&pool, &config, order.id).await;

        let row = cpilot_db::get_work_order(&pool, order.id)
            .await
            .expect("load")
            .expect("exists");
        assert_eq!(row.status, "completed");
        let snapshots = row.snapshots().expect("snapshots");
        assert_eq!(snapshots[0].variant_id.as_deref(), Some("501"));

        let mirror = cpilot_db::get_variant_prices(&pool, user_id, "101", "501")
            .await
            .expect("read mirror")
            .expect("variant row");
        assert_eq!(mirror.regular_price, Some("9.99".parse().expect("decimal")));

        // Product-level prices stay untouched.
        let product = cpilot_db::get_product_prices(&pool, user_id, "101")
            .await
            .expect("read mirror")
            .expect("product row");
        assert_eq!(
            product.regular_price,
            Some("19.99".parse().expect("decimal"))
        );
    }
}
