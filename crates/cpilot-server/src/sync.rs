//! Catalog sync: pages a tenant's BigCommerce products into the local mirror.
//!
//! The mirror is fully replaced on every run. The tenant's subscription plan
//! caps how many products are stored; overflow is truncated, not an error.
//! Cancellation is cooperative: a per-tenant flag checked between pages.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

use cpilot_bigcommerce::{BigCommerceClient, BigCommerceError, Credentials, HttpSettings};
use cpilot_core::{AppConfig, SubscriptionPlan};
use cpilot_db::DbError;

/// Hard cap on pages per sync, independent of plan, against a paging cursor
/// that never advances.
const SYNC_MAX_PAGES: u32 = 200;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("BigCommerce credentials are not configured")]
    MissingCredentials,

    #[error("sync cancelled")]
    Cancelled,

    #[error("sync page limit of {0} exceeded")]
    PageLimit(u32),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    BigCommerce(#[from] BigCommerceError),
}

impl SyncError {
    /// Stable code for the terminal `error:` chunk of the progress stream.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingCredentials => "missing_credentials",
            Self::Cancelled => "cancelled",
            Self::PageLimit(_) => "page_limit",
            Self::Db(_) => "internal_error",
            Self::BigCommerce(_) => "upstream_error",
        }
    }
}

/// Progress events emitted while a sync runs.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum SyncProgress {
    Started {
        plan: String,
        limit: usize,
    },
    PageFetched {
        page: u32,
        fetched: usize,
        total_available: u64,
    },
    Writing {
        product_count: usize,
    },
}

/// Terminal summary of a successful sync.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SyncSummary {
    pub product_count: usize,
    pub variant_count: usize,
    pub is_limited: bool,
    pub limit: usize,
}

/// Per-tenant cancellation flags for in-flight syncs.
#[derive(Debug, Clone, Default)]
pub struct SyncSessions {
    flags: Arc<Mutex<HashMap<i64, Arc<AtomicBool>>>>,
}

impl SyncSessions {
    /// Registers a cancel flag for the tenant. Returns `None` while a sync is
    /// already running for that tenant, so two runs never race through the
    /// mirror rewrite (and the first run's flag stays cancellable).
    #[must_use]
    pub async fn begin(&self, user_id: i64) -> Option<Arc<AtomicBool>> {
        let mut flags = self.flags.lock().await;
        if flags.contains_key(&user_id) {
            return None;
        }
        let flag = Arc::new(AtomicBool::new(false));
        flags.insert(user_id, Arc::clone(&flag));
        Some(flag)
    }

    /// Flips the tenant's cancel flag. Returns `false` when no sync is active.
    pub async fn cancel(&self, user_id: i64) -> bool {
        match self.flags.lock().await.get(&user_id) {
            Some(flag) => {
                flag.store(true, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    pub async fn finish(&self, user_id: i64) {
        self.flags.lock().await.remove(&user_id);
    }
}

/// Runs a full catalog sync for one tenant.
///
/// Progress events are sent over `progress`; a dropped receiver does not stop
/// the sync (the client may disconnect from the stream mid-run).
///
/// # Errors
///
/// - [`SyncError::MissingCredentials`] — the tenant has no `api_settings`.
/// - [`SyncError::Cancelled`] — the cancel flag was set between pages.
/// - [`SyncError::PageLimit`] — the page cap was hit.
/// - [`SyncError::BigCommerce`] — a page or variant fetch failed; the mirror
///   is left as-is (possibly partially rewritten, per the non-transactional
///   replace).
/// - [`SyncError::Db`] — a plan lookup or mirror write failed.
pub async fn run_sync(
    pool: &PgPool,
    config: &AppConfig,
    user_id: i64,
    cancel: &AtomicBool,
    progress: &mpsc::Sender<SyncProgress>,
) -> Result<SyncSummary, SyncError> {
    let settings = cpilot_db::get_api_settings(pool, user_id)
        .await?
        .ok_or(SyncError::MissingCredentials)?;

    let plan = cpilot_db::get_user_plan(pool, user_id)
        .await?
        .map_or(SubscriptionPlan::Trial, |p| SubscriptionPlan::from_db(&p));
    let limit = plan.product_limit();

    let client = BigCommerceClient::new(
        &HttpSettings::from_app_config(config),
        Credentials {
            store_hash: settings.store_hash,
            access_token: settings.access_token,
            client_id: settings.client_id,
        },
    )?;

    let _ = progress
        .send(SyncProgress::Started {
            plan: plan.as_str().to_owned(),
            limit,
        })
        .await;

    tracing::info!(user_id, plan = plan.as_str(), limit, "starting catalog sync");

    let mut products = Vec::new();
    let mut total_available = 0u64;
    let mut page = 1u32;

    loop {
        if cancel.load(Ordering::Relaxed) {
            tracing::info!(user_id, page, "sync cancelled between pages");
            return Err(SyncError::Cancelled);
        }
        if page > SYNC_MAX_PAGES {
            return Err(SyncError::PageLimit(SYNC_MAX_PAGES));
        }
        if page > 1 && config.sync_inter_page_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(config.sync_inter_page_delay_ms)).await;
        }

        let (batch, pagination) = client
            .fetch_products_page(page, config.sync_page_size)
            .await?;
        total_available = pagination.total;
        products.extend(batch);

        let _ = progress
            .send(SyncProgress::PageFetched {
                page,
                fetched: products.len(),
                total_available,
            })
            .await;

        if products.len() >= limit {
            products.truncate(limit);
            break;
        }
        if !pagination.has_next_page() {
            break;
        }
        page += 1;
    }

    let mut synced = Vec::with_capacity(products.len());
    for product in products {
        let variants = match product.variants.clone() {
            Some(variants) => variants,
            // `include=variants` caps the embedded list; fall back to the
            // dedicated endpoint when the field is absent.
            None => client.fetch_variants(product.id).await?,
        };
        synced.push(product.into_synced(variants));
    }

    let _ = progress
        .send(SyncProgress::Writing {
            product_count: synced.len(),
        })
        .await;

    let (product_count, variant_count) = cpilot_db::replace_products(pool, user_id, &synced).await?;

    let summary = SyncSummary {
        product_count,
        variant_count,
        is_limited: (total_available as usize) > limit,
        limit,
    };

    tracing::info!(
        user_id,
        product_count,
        variant_count,
        is_limited = summary.is_limited,
        "catalog sync complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const STORE_HASH: &str = "sync-store";

    fn test_config(api_base: &str, page_size: u32) -> AppConfig {
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
            sync_page_size: page_size,
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

    fn products_page_json(ids: &[i64], current_page: u64, total_pages: u64, total: u64) -> serde_json::Value {
        let data: Vec<serde_json::Value> = ids
            .iter()
            .map(|id| {
                json!({
                    "id": id,
                    "name": format!("Product {id}"),
                    "price": 10.0,
                    "variants": [
                        { "id": id * 10, "product_id": id, "price": 10.0 }
                    ]
                })
            })
            .collect();
        json!({
            "data": data,
            "meta": { "pagination": {
                "total": total,
                "count": ids.len(),
                "per_page": 3,
                "current_page": current_page,
                "total_pages": total_pages
            }}
        })
    }

    async fn mount_page(server: &MockServer, page: &str, body: &serde_json::Value) {
        Mock::given(method("GET"))
            .and(path(format!("/stores/{STORE_HASH}/v3/catalog/products")))
            .and(query_param("page", page))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    fn idle_cancel() -> AtomicBool {
        AtomicBool::new(false)
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn trial_plan_truncates_to_five_and_reports_limited(pool: PgPool) {
        let server = MockServer::start().await;
        // A 50-product store paged 3 at a time; trial stops after 5 products.
        mount_page(&server, "1", &products_page_json(&[1, 2, 3], 1, 17, 50)).await;
        mount_page(&server, "2", &products_page_json(&[4, 5, 6], 2, 17, 50)).await;

        let user_id = seed_tenant(&pool, "sync-trial@example.com").await;
        let config = test_config(&server.uri(), 3);
        let cancel = idle_cancel();
        let (tx, mut rx) = mpsc::channel(64);

        let summary = run_sync(&pool, &config, user_id, &cancel, &tx)
            .await
            .expect("sync");

        assert_eq!(summary.product_count, 5);
        assert_eq!(summary.variant_count, 5);
        assert!(summary.is_limited);
        assert_eq!(summary.limit, 5);

        let stored = cpilot_db::count_products(&pool, user_id).await.expect("count");
        assert_eq!(stored, 5);

        drop(tx);
        let mut events = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            events.push(ev);
        }
        assert!(matches!(events.first(), Some(SyncProgress::Started { limit: 5, .. })));
        assert!(events
            .iter()
            .any(|ev| matches!(ev, SyncProgress::PageFetched { page: 2, .. })));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn rerun_fully_replaces_the_mirror(pool: PgPool) {
        let server = MockServer::start().await;
        // First run sees products 1 and 2; once that mock is exhausted the
        // second run sees only product 3.
        Mock::given(method("GET"))
            .and(path(format!("/stores/{STORE_HASH}/v3/catalog/products")))
            .and(query_param("page", "1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(&products_page_json(&[1, 2], 1, 1, 2)),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        mount_page(&server, "1", &products_page_json(&[3], 1, 1, 1)).await;

        let user_id = seed_tenant(&pool, "sync-rerun@example.com").await;
        let config = test_config(&server.uri(), 50);
        let (tx, _rx) = mpsc::channel(64);

        let first = run_sync(&pool, &config, user_id, &idle_cancel(), &tx)
            .await
            .expect("first sync");
        assert_eq!(first.product_count, 2);

        let second = run_sync(&pool, &config, user_id, &idle_cancel(), &tx)
            .await
            .expect("second sync");
        assert_eq!(second.product_count, 1);

        let survivor = cpilot_db::get_product_by_source_id(&pool, user_id, "3")
            .await
            .expect("lookup");
        assert!(survivor.is_some());
        let stale = cpilot_db::get_product_by_source_id(&pool, user_id, "1")
            .await
            .expect("lookup");
        assert!(stale.is_none(), "stale rows must not survive a re-sync");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn cancel_flag_aborts_before_fetching(pool: PgPool) {
        let user_id = seed_tenant(&pool, "sync-cancel@example.com").await;
        let config = test_config("http://127.0.0.1:9", 50);
        let cancel = AtomicBool::new(true);
        let (tx, _rx) = mpsc::channel(64);

        let result = run_sync(&pool, &config, user_id, &cancel, &tx).await;
        assert!(matches!(result, Err(SyncError::Cancelled)));
        assert_eq!(result.unwrap_err().code(), "cancelled");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn missing_credentials_reject_the_sync(pool: PgPool) {
        let user_id =
            sqlx::query_scalar::<_, i64>("INSERT INTO users (email) VALUES ($1) RETURNING id")
                .bind("sync-nocreds@example.com")
                .fetch_one(&pool)
                .await
                .expect("seed user");
        let config = test_config("http://127.0.0.1:9", 50);
        let (tx, _rx) = mpsc::channel(64);

        let result = run_sync(&pool, &config, user_id, &idle_cancel(), &tx).await;
        assert!(matches!(result, Err(SyncError::MissingCredentials)));
    }

    #[tokio::test]
    async fn cancel_returns_false_without_an_active_session() {
        let sessions = SyncSessions::default();
        assert!(!sessions.cancel(7).await);

        let flag = sessions.begin(7).await.expect("no sync active");
        assert!(sessions.cancel(7).await);
        assert!(flag.load(Ordering::Relaxed));

        sessions.finish(7).await;
        assert!(!sessions.cancel(7).await);
    }

    #[tokio::test]
    async fn second_begin_is_rejected_while_a_sync_is_active() {
        let sessions = SyncSessions::default();

        let first = sessions.begin(7).await.expect("first begin");
        assert!(sessions.begin(7).await.is_none(), "tenant already syncing");

        // The first run's flag stays wired to cancel.
        assert!(sessions.cancel(7).await);
        assert!(first.load(Ordering::Relaxed));

        // Another tenant is unaffected, and finishing frees the slot.
        assert!(sessions.begin(8).await.is_some());
        sessions.finish(7).await;
        assert!(sessions.begin(7).await.is_some());
    }
}
