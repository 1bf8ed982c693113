//! Wire types for the BigCommerce v3 catalog API.
//!
//! v3 responses wrap payloads in `{ "data": ..., "meta": ... }`, with paging
//! state embedded in `meta.pagination` rather than in response headers.

use serde::{Deserialize, Serialize};

use cpilot_core::catalog::{SyncedProduct, SyncedVariant};

/// A product from `GET /catalog/products`.
///
/// `variants` is only populated when the request used `include=variants`;
/// BigCommerce omits the field otherwise.
#[derive(Debug, Clone, Deserialize)]
pub struct BcProduct {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub sku: Option<String>,
    /// Prices are JSON numbers on the wire; converted to `NUMERIC(10,2)` at
    /// the persistence boundary.
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub sale_price: Option<f64>,
    #[serde(default)]
    pub variants: Option<Vec<BcVariant>>,
}

impl BcProduct {
    /// Normalizes for storage, consuming the embedded variants (or the
    /// separately fetched set when `include=variants` was capped).
    #[must_use]
    pub fn into_synced(self, variants: Vec<BcVariant>) -> SyncedProduct {
        SyncedProduct {
            source_product_id: self.id.to_string(),
            name: self.name,
            sku: self.sku,
            regular_price: self.price,
            sale_price: self.sale_price,
            variants: variants.into_iter().map(BcVariant::into_synced).collect(),
        }
    }
}

/// A variant from `GET /catalog/products/{id}/variants` or an embedded
/// `include=variants` expansion.
#[derive(Debug, Clone, Deserialize)]
pub struct BcVariant {
    pub id: i64,
    pub product_id: i64,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub sale_price: Option<f64>,
}

impl BcVariant {
    #[must_use]
    pub fn into_synced(self) -> SyncedVariant {
        SyncedVariant {
            source_variant_id: self.id.to_string(),
            sku: self.sku,
            regular_price: self.price,
            sale_price: self.sale_price,
        }
    }
}

/// A category from `GET /catalog/categories`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BcCategory {
    pub id: i64,
    pub parent_id: i64,
    pub name: String,
}

/// `meta` block of a paged v3 response.
#[derive(Debug, Clone, Deserialize)]
pub struct PageMeta {
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Pagination {
    /// Total records matching the query across all pages.
    pub total: u64,
    pub count: u64,
    pub per_page: u64,
    pub current_page: u64,
    pub total_pages: u64,
}

impl Pagination {
    #[must_use]
    pub fn has_next_page(&self) -> bool {
        self.current_page < self.total_pages
    }
}

/// One page of a v3 collection response.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Page<T> {
    pub data: Vec<T>,
    pub meta: PageMeta,
}

/// Body for `PUT /catalog/products/{id}` and
/// `PUT /catalog/products/{id}/variants/{variant_id}`.
///
/// Omitted fields are left untouched by BigCommerce — partial-update
/// semantics, which is what work-order execution relies on.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PriceUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sale_price: Option<f64>,
}

impl PriceUpdate {
    /// `true` when the body would be an empty object — callers skip the PUT.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.price.is_none() && self.sale_price.is_none()
    }
}
