//! Typed client for the BigCommerce v3 catalog API.
//!
//! Read paths (products, variants, categories) drive the catalog sync; write
//! paths (product and variant price updates) drive work-order execution and
//! undo. Transient failures (429, network errors) are retried with
//! exponential backoff; other failures surface as typed errors.

mod client;
mod error;
mod retry;
mod types;

pub use client::{BigCommerceClient, Credentials, FetchedCatalog, HttpSettings};
pub use error::BigCommerceError;
pub use types::{BcCategory, BcProduct, BcVariant, PageMeta, Pagination, PriceUpdate};
