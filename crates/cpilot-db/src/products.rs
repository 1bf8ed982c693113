//! Database operations for the locally mirrored catalog: `products` and
//! `product_variants`.
//!
//! The mirror is not authoritative — BigCommerce is the source of truth. Sync
//! fully replaces a tenant's rows; work-order execution patches individual
//! prices so the mirror tracks what was just written upstream.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use cpilot_core::catalog::SyncedProduct;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `products` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductRow {
    pub id: i64,
    pub user_id: i64,
    /// BigCommerce numeric product ID as a string.
    pub source_product_id: String,
    pub name: String,
    pub sku: Option<String>,
    pub regular_price: Option<Decimal>,
    pub sale_price: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A row from the `product_variants` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VariantRow {
    pub id: i64,
    pub product_id: i64,
    /// BigCommerce numeric variant ID as a string.
    pub source_variant_id: String,
    pub sku: Option<String>,
    pub regular_price: Option<Decimal>,
    pub sale_price: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The price pair currently held by the mirror for a product or variant.
#[derive(Debug, Clone, Copy, sqlx::FromRow)]
pub struct MirrorPrices {
    pub regular_price: Option<Decimal>,
    pub sale_price: Option<Decimal>,
}

/// Filters for the product listing endpoint.
#[derive(Debug, Clone, Default)]
pub struct ProductListFilters<'a> {
    /// Case-insensitive substring match against name and SKU.
    pub search: Option<&'a str>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

// ---------------------------------------------------------------------------
// Sync writes
// ---------------------------------------------------------------------------

/// Replaces the tenant's entire mirrored catalog with `products`.
///
/// Deletes all of the tenant's product rows (variants cascade), then inserts
/// the new batch. The clear and rewrite are intentionally NOT wrapped in a
/// transaction: a mid-sync failure leaves a partial mirror until the next
/// successful sync, and the mirror is never authoritative.
///
/// Prices arrive as `f64` from the API client and are cast to fixed-scale
/// `NUMERIC(10,2)` by the database engine — the documented precision boundary
/// for scrape-time floating values.
///
/// Returns `(product_count, variant_count)` written.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any delete or insert fails.
pub async fn replace_products(
    pool: &PgPool,
    user_id: i64,
    products: &[SyncedProduct],
) -> Result<(usize, usize), DbError> {
    sqlx::query("DELETE FROM products WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;

    let mut variant_count = 0usize;

    for product in products {
        let product_id: i64 = sqlx::query_scalar::<_, i64>(
            "INSERT INTO products \
                 (user_id, source_product_id, name, sku, regular_price, sale_price) \
             VALUES ($1, $2, $3, $4, $5::numeric(10,2), $6::numeric(10,2)) \
             RETURNING id",
        )
        .bind(user_id)
        .bind(&product.source_product_id)
        .bind(&product.name)
        .bind(&product.sku)
        .bind(product.regular_price)
        .bind(product.sale_price)
        .fetch_one(pool)
        .await?;

        for variant in &product.variants {
            sqlx::query(
                "INSERT INTO product_variants \
                     (product_id, source_variant_id, sku, regular_price, sale_price) \
                 VALUES ($1, $2, $3, $4::numeric(10,2), $5::numeric(10,2))",
            )
            .bind(product_id)
            .bind(&variant.source_variant_id)
            .bind(&variant.sku)
            .bind(variant.regular_price)
            .bind(variant.sale_price)
            .execute(pool)
            .await?;
            variant_count += 1;
        }
    }

    Ok((products.len(), variant_count))
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Counts the tenant's mirrored products.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_products(pool: &PgPool, user_id: i64) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM products WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Escapes `%`, `_` and `\` so a search term matches literally inside an
/// ILIKE pattern.
fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Lists the tenant's mirrored products, newest first, with optional search
/// and pagination.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_products(
    pool: &PgPool,
    user_id: i64,
    filters: ProductListFilters<'_>,
) -> Result<Vec<ProductRow>, DbError> {
    let pattern = filters.search.map(|s| format!("%{}%", escape_like(s)));

    let rows = sqlx::query_as::<_, ProductRow>(
        "SELECT id, user_id, source_product_id, name, sku, \
                regular_price, sale_price, created_at, updated_at \
         FROM products \
         WHERE user_id = $1 \
           AND ($2::text IS NULL OR name ILIKE $2 OR sku ILIKE $2) \
         ORDER BY name ASC, id ASC \
         LIMIT $3 OFFSET $4",
    )
    .bind(user_id)
    .bind(pattern)
    .bind(filters.limit.unwrap_or(50))
    .bind(filters.offset.unwrap_or(0))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Looks up a mirrored product by its BigCommerce ID within a tenant.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_product_by_source_id(
    pool: &PgPool,
    user_id: i64,
    source_product_id: &str,
) -> Result<Option<ProductRow>, DbError> {
    let row = sqlx::query_as::<_, ProductRow>(
        "SELECT id, user_id, source_product_id, name, sku, \
                regular_price, sale_price, created_at, updated_at \
         FROM products \
         WHERE user_id = $1 AND source_product_id = $2",
    )
    .bind(user_id)
    .bind(source_product_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Lists the variants of a mirrored product.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_variants(pool: &PgPool, product_id: i64) -> Result<Vec<VariantRow>, DbError> {
    let rows = sqlx::query_as::<_, VariantRow>(
        "SELECT id, product_id, source_variant_id, sku, \
                regular_price, sale_price, created_at, updated_at \
         FROM product_variants \
         WHERE product_id = $1 \
         ORDER BY id ASC",
    )
    .bind(product_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns the mirror's current prices for a product, if it exists locally.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_product_prices(
    pool: &PgPool,
    user_id: i64,
    source_product_id: &str,
) -> Result<Option<MirrorPrices>, DbError> {
    let row = sqlx::query_as::<_, MirrorPrices>(
        "SELECT regular_price, sale_price \
         FROM products \
         WHERE user_id = $1 AND source_product_id = $2",
    )
    .bind(user_id)
    .bind(source_product_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Returns the mirror's current prices for a variant, if it exists locally.
///
/// Joins through `products` so the lookup stays tenant-scoped.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_variant_prices(
    pool: &PgPool,
    user_id: i64,
    source_product_id: &str,
    source_variant_id: &str,
) -> Result<Option<MirrorPrices>, DbError> {
    let row = sqlx::query_as::<_, MirrorPrices>(
        "SELECT v.regular_price, v.sale_price \
         FROM product_variants v \
         JOIN products p ON p.id = v.product_id \
         WHERE p.user_id = $1 AND p.source_product_id = $2 AND v.source_variant_id = $3",
    )
    .bind(user_id)
    .bind(source_product_id)
    .bind(source_variant_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

// ---------------------------------------------------------------------------
// Mirror price writes (work-order execution and undo)
// ---------------------------------------------------------------------------

/// Sets a mirrored product's prices exactly (including back to `NULL`).
///
/// Callers merge unchanged fields themselves: execution combines the captured
/// snapshot with the requested update, undo writes the snapshot verbatim.
///
/// Returns `true` if a row was updated.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn set_product_prices(
    pool: &PgPool,
    user_id: i64,
    source_product_id: &str,
    regular_price: Option<Decimal>,
    sale_price: Option<Decimal>,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE products \
         SET regular_price = $3, sale_price = $4, updated_at = NOW() \
         WHERE user_id = $1 AND source_product_id = $2",
    )
    .bind(user_id)
    .bind(source_product_id)
    .bind(regular_price)
    .bind(sale_price)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Sets a mirrored variant's prices exactly (including back to `NULL`).
///
/// Returns `true` if a row was updated.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn set_variant_prices(
    pool: &PgPool,
    user_id: i64,
    source_product_id: &str,
    source_variant_id: &str,
    regular_price: Option<Decimal>,
    sale_price: Option<Decimal>,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE product_variants v \
         SET regular_price = $4, sale_price = $5, updated_at = NOW() \
         FROM products p \
         WHERE p.id = v.product_id \
           AND p.user_id = $1 \
           AND p.source_product_id = $2 \
           AND v.source_variant_id = $3",
    )
    .bind(user_id)
    .bind(source_product_id)
    .bind(source_variant_id)
    .bind(regular_price)
    .bind(sale_price)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpilot_core::catalog::SyncedVariant;

    async fn seed_user(pool: &PgPool, email: &str) -> i64 {
        sqlx::query_scalar::<_, i64>("INSERT INTO users (email) VALUES ($1) RETURNING id")
            .bind(email)
            .fetch_one(pool)
            .await
            .expect("seed user")
    }

    fn synced_product(id: &str, name: &str, price: f64) -> SyncedProduct {
        SyncedProduct {
            source_product_id: id.to_string(),
            name: name.to_string(),
            sku: Some(format!("SKU-{id}")),
            regular_price: Some(price),
            sale_price: None,
            variants: vec![SyncedVariant {
                source_variant_id: format!("{id}-v1"),
                sku: None,
                regular_price: Some(price),
                sale_price: None,
            }],
        }
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn replace_products_fully_replaces_prior_mirror(pool: PgPool) {
        let user_id = seed_user(&pool, "replace@example.com").await;

        let first = vec![
            synced_product("100", "Old A", 10.0),
            synced_product("101", "Old B", 11.0),
        ];
        replace_products(&pool, user_id, &first).await.expect("first sync");

        let second = vec![synced_product("200", "New A", 20.0)];
        let (written, variants) = replace_products(&pool, user_id, &second)
            .await
            .expect("second sync");

        assert_eq!(written, 1);
        assert_eq!(variants, 1);
        assert_eq!(count_products(&pool, user_id).await.unwrap(), 1);

        // No stale rows survive a re-sync.
        assert!(get_product_by_source_id(&pool, user_id, "100")
            .await
            .unwrap()
            .is_none());
        assert!(get_product_by_source_id(&pool, user_id, "200")
            .await
            .unwrap()
            .is_some());
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn replace_products_is_tenant_scoped(pool: PgPool) {
        let alice = seed_user(&pool, "alice@example.com").await;
        let bob = seed_user(&pool, "bob@example.com").await;

        replace_products(&pool, alice, &[synced_product("1", "Alice P", 1.0)])
            .await
            .expect("alice sync");
        replace_products(&pool, bob, &[synced_product("2", "Bob P", 2.0)])
            .await
            .expect("bob sync");

        // Bob's sync must not clear Alice's mirror.
        assert_eq!(count_products(&pool, alice).await.unwrap(), 1);
        assert_eq!(count_products(&pool, bob).await.unwrap(), 1);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn set_and_read_variant_prices(pool: PgPool) {
        let user_id = seed_user(&pool, "variant@example.com").await;
        replace_products(&pool, user_id, &[synced_product("100", "P", 12.5)])
            .await
            .expect("sync");

        let updated = set_variant_prices(
            &pool,
            user_id,
            "100",
            "100-v1",
            Some(Decimal::new(999, 2)),
            Some(Decimal::new(799, 2)),
        )
        .await
        .expect("set variant prices");
        assert!(updated);

        let prices = get_variant_prices(&pool, user_id, "100", "100-v1")
            .await
            .expect("get variant prices")
            .expect("variant exists");
        assert_eq!(prices.regular_price, Some(Decimal::new(999, 2)));
        assert_eq!(prices.sale_price, Some(Decimal::new(799, 2)));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn list_products_search_matches_name_and_sku(pool: PgPool) {
        let user_id = seed_user(&pool, "search@example.com").await;
        replace_products(
            &pool,
            user_id,
            &[
                synced_product("1", "Blue Widget", 5.0),
                synced_product("2", "Red Gadget", 6.0),
            ],
        )
        .await
        .expect("sync");

        let by_name = list_products(
            &pool,
            user_id,
            ProductListFilters {
                search: Some("widget"),
                ..ProductListFilters::default()
            },
        )
        .await
        .expect("search by name");
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].name, "Blue Widget");

        let by_sku = list_products(
            &pool,
            user_id,
            ProductListFilters {
                search: Some("SKU-2"),
                ..ProductListFilters::default()
            },
        )
        .await
        .expect("search by sku");
        assert_eq!(by_sku.len(), 1);
        assert_eq!(by_sku[0].source_product_id, "2");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn search_treats_like_wildcards_literally(pool: PgPool) {
        let user_id = seed_user(&pool, "wildcard@example.com").await;
        replace_products(
            &pool,
            user_id,
            &[
                synced_product("1", "100% Cotton Tee", 15.0),
                synced_product("2", "1000 Piece Puzzle", 20.0),
                synced_product("3", "A_B Bracket", 8.0),
                synced_product("4", "AxB Bracket", 9.0),
            ],
        )
        .await
        .expect("sync");

        let percent = list_products(
            &pool,
            user_id,
            ProductListFilters {
                search: Some("100%"),
                ..ProductListFilters::default()
            },
        )
        .await
        .expect("search with percent");
        assert_eq!(percent.len(), 1);
        assert_eq!(percent[0].name, "100% Cotton Tee");

        let underscore = list_products(
            &pool,
            user_id,
            ProductListFilters {
                search: Some("A_B"),
                ..ProductListFilters::default()
            },
        )
        .await
        .expect("search with underscore");
        assert_eq!(underscore.len(), 1);
        assert_eq!(underscore[0].name, "A_B Bracket");
    }
}
