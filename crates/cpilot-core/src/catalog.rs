//! Normalized catalog entities produced by a BigCommerce fetch, ready for
//! persistence into the local mirror.

use serde::{Deserialize, Serialize};

/// A product fetched from BigCommerce, normalized for storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncedProduct {
    /// BigCommerce numeric product ID, stored as a string to avoid precision loss.
    pub source_product_id: String,
    pub name: String,
    pub sku: Option<String>,
    /// Boundary note: BigCommerce returns prices as JSON numbers. These are
    /// carried as `f64` here and cast to `NUMERIC(10,2)` at persistence, so
    /// values are rounded to two decimal places at write time.
    pub regular_price: Option<f64>,
    pub sale_price: Option<f64>,
    pub variants: Vec<SyncedVariant>,
}

impl SyncedProduct {
    #[must_use]
    pub fn variant_count(&self) -> usize {
        self.variants.len()
    }
}

/// A single purchasable variant of a [`SyncedProduct`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncedVariant {
    /// BigCommerce numeric variant ID, stored as a string to avoid precision loss.
    pub source_variant_id: String,
    pub sku: Option<String>,
    /// Boundary note: converted to `NUMERIC(10,2)` when persisted.
    pub regular_price: Option<f64>,
    pub sale_price: Option<f64>,
}
