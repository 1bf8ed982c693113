//! HTTP client for the BigCommerce v3 catalog API.

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;

use crate::error::BigCommerceError;
use crate::retry::retry_with_backoff;
use crate::types::{BcCategory, BcProduct, BcVariant, Page, Pagination, PriceUpdate};

/// Maximum number of pages to fetch before returning an error.
/// Prevents infinite loops on a paging cursor that never advances.
///
/// Note: each page request may be retried up to `max_retries` times on
/// transient errors, so the effective worst-case request count is
/// `MAX_PAGES * (1 + max_retries)`.
const MAX_PAGES: usize = 200;

/// Per-tenant BigCommerce store credentials, loaded from `api_settings`.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub store_hash: String,
    pub access_token: String,
    pub client_id: String,
}

/// Transport settings shared by every client instance.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// Overridable so tests and staging can point at a mock server.
    pub api_base: String,
    pub timeout_secs: u64,
    /// Maximum number of retry attempts after the first failure.
    pub max_retries: u32,
    /// Base delay in seconds for exponential backoff: `backoff_base_secs * 2^attempt`.
    pub backoff_base_secs: u64,
}

impl HttpSettings {
    #[must_use]
    pub fn from_app_config(config: &cpilot_core::AppConfig) -> Self {
        Self {
            api_base: config.bigcommerce_api_base.clone(),
            timeout_secs: config.bigcommerce_request_timeout_secs,
            max_retries: config.bigcommerce_max_retries,
            backoff_base_secs: config.bigcommerce_retry_backoff_base_secs,
        }
    }
}

/// All products of a store collected across pages, plus how many the store
/// reported in total (which may exceed what was collected when a ceiling was
/// applied).
#[derive(Debug, Clone)]
pub struct FetchedCatalog {
    pub products: Vec<BcProduct>,
    pub total_available: u64,
}

/// Client for one tenant's BigCommerce store.
///
/// Auth is header-based (`X-Auth-Token`/`X-Auth-Client`). Rate limiting
/// (429), not-found (404), and other non-2xx responses surface as typed
/// errors; transient errors are retried with exponential backoff.
pub struct BigCommerceClient {
    client: Client,
    api_base: String,
    credentials: Credentials,
    max_retries: u32,
    backoff_base_secs: u64,
}

impl BigCommerceClient {
    /// Creates a client with configured timeout and retry policy.
    ///
    /// # Errors
    ///
    /// Returns [`BigCommerceError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed (e.g., invalid TLS config).
    pub fn new(
        settings: &HttpSettings,
        credentials: Credentials,
    ) -> Result<Self, BigCommerceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            api_base: settings.api_base.trim_end_matches('/').to_owned(),
            credentials,
            max_retries: settings.max_retries,
            backoff_base_secs: settings.backoff_base_secs,
        })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{base}/stores/{hash}/v3{path}",
            base = self.api_base,
            hash = self.credentials.store_hash
        )
    }

    /// Fetches one page of products, with embedded variants requested.
    ///
    /// # Errors
    ///
    /// - [`BigCommerceError::RateLimited`] — HTTP 429 after all retries exhausted.
    /// - [`BigCommerceError::NotFound`] — HTTP 404 (not retried).
    /// - [`BigCommerceError::UnexpectedStatus`] — any other non-2xx status.
    /// - [`BigCommerceError::Http`] — network failure after all retries exhausted.
    /// - [`BigCommerceError::Deserialize`] — response body is not valid JSON (not retried).
    pub async fn fetch_products_page(
        &self,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<BcProduct>, Pagination), BigCommerceError> {
        let url = self.url(&format!(
            "/catalog/products?include=variants&page={page}&limit={limit}"
        ));
        let parsed: Page<BcProduct> = self.get_json(&url, "products page").await?;
        Ok((parsed.data, parsed.meta.pagination))
    }

    /// Fetches products page by page until the last page, an optional product
    /// ceiling, or [`MAX_PAGES`] is reached.
    ///
    /// `inter_page_delay_ms` is applied between page requests (never before
    /// the first). When `max_products` is hit the result is truncated to
    /// exactly that many products and remaining pages are not fetched;
    /// `total_available` still reports the store's full count so callers can
    /// tell truncation happened.
    ///
    /// # Errors
    ///
    /// Propagates any error from [`Self::fetch_products_page`]. Returns
    /// [`BigCommerceError::PaginationLimit`] past [`MAX_PAGES`] pages.
    pub async fn fetch_all_products(
        &self,
        limit: u32,
        inter_page_delay_ms: u64,
        max_products: Option<usize>,
    ) -> Result<FetchedCatalog, BigCommerceError> {
        let mut products: Vec<BcProduct> = Vec::new();
        let mut total_available = 0u64;
        let mut page = 1u32;
        let mut page_count = 0usize;

        loop {
            page_count += 1;
            if page_count > MAX_PAGES {
                return Err(BigCommerceError::PaginationLimit {
                    store_hash: self.credentials.store_hash.clone(),
                    max_pages: MAX_PAGES,
                });
            }

            if page_count > 1 && inter_page_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(inter_page_delay_ms)).await;
            }

            let (batch, pagination) = self.fetch_products_page(page, limit).await?;
            total_available = pagination.total;
            products.extend(batch);

            if let Some(max) = max_products {
                if products.len() >= max {
                    products.truncate(max);
                    break;
                }
            }

            if !pagination.has_next_page() {
                break;
            }
            page += 1;
        }

        Ok(FetchedCatalog {
            products,
            total_available,
        })
    }

    /// Fetches all variants of a product.
    ///
    /// # Errors
    ///
    /// Same error surface as [`Self::fetch_products_page`].
    pub async fn fetch_variants(
        &self,
        product_id: i64,
    ) -> Result<Vec<BcVariant>, BigCommerceError> {
        let mut variants: Vec<BcVariant> = Vec::new();
        let mut page = 1u32;

        loop {
            let url = self.url(&format!(
                "/catalog/products/{product_id}/variants?page={page}&limit=250"
            ));
            let parsed: Page<BcVariant> = self.get_json(&url, "variants page").await?;
            variants.extend(parsed.data);

            if !parsed.meta.pagination.has_next_page() {
                break;
            }
            page += 1;
        }

        Ok(variants)
    }

    /// Fetches the store's category tree (flat list).
    ///
    /// # Errors
    ///
    /// Same error surface as [`Self::fetch_products_page`].
    pub async fn fetch_categories(&self) -> Result<Vec<BcCategory>, BigCommerceError> {
        let mut categories: Vec<BcCategory> = Vec::new();
        let mut page = 1u32;

        loop {
            let url = self.url(&format!("/catalog/categories?page={page}&limit=250"));
            let parsed: Page<BcCategory> = self.get_json(&url, "categories page").await?;
            categories.extend(parsed.data);

            if !parsed.meta.pagination.has_next_page() {
                break;
            }
            page += 1;
        }

        Ok(categories)
    }

    /// Updates a product's prices via `PUT /catalog/products/{id}`.
    ///
    /// Fields absent from `update` are left untouched upstream. A fully empty
    /// update is skipped without a request.
    ///
    /// # Errors
    ///
    /// Same error surface as [`Self::fetch_products_page`].
    pub async fn update_product_price(
        &self,
        product_id: i64,
        update: PriceUpdate,
    ) -> Result<(), BigCommerceError> {
        if update.is_empty() {
            return Ok(());
        }
        let url = self.url(&format!("/catalog/products/{product_id}"));
        self.put_json(&url, &update).await
    }

    /// Updates a variant's prices via
    /// `PUT /catalog/products/{id}/variants/{variant_id}`.
    ///
    /// # Errors
    ///
    /// Same error surface as [`Self::fetch_products_page`].
    pub async fn update_variant_price(
        &self,
        product_id: i64,
        variant_id: i64,
        update: PriceUpdate,
    ) -> Result<(), BigCommerceError> {
        if update.is_empty() {
            return Ok(());
        }
        let url = self.url(&format!(
            "/catalog/products/{product_id}/variants/{variant_id}"
        ));
        self.put_json(&url, &update).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        context: &str,
    ) -> Result<T, BigCommerceError> {
        retry_with_backoff(self.max_retries, self.backoff_base_secs, || {
            let url = url.to_owned();
            let context = context.to_owned();
            async move {
                let response = self
                    .client
                    .get(&url)
                    .header("X-Auth-Token", &self.credentials.access_token)
                    .header("X-Auth-Client", &self.credentials.client_id)
                    .header(reqwest::header::ACCEPT, "application/json")
                    .send()
                    .await?;

                let response = self.check_status(&url, response)?;
                let body = response.text().await?;
                serde_json::from_str::<T>(&body).map_err(|e| BigCommerceError::Deserialize {
                    context: format!("{context} from {url}"),
                    source: e,
                })
            }
        })
        .await
    }

    async fn put_json<B: serde::Serialize + Sync>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<(), BigCommerceError> {
        retry_with_backoff(self.max_retries, self.backoff_base_secs, || {
            let url = url.to_owned();
            async move {
                let response = self
                    .client
                    .put(&url)
                    .header("X-Auth-Token", &self.credentials.access_token)
                    .header("X-Auth-Client", &self.credentials.client_id)
                    .header(reqwest::header::ACCEPT, "application/json")
                    .json(body)
                    .send()
                    .await?;

                self.check_status(&url, response)?;
                Ok(())
            }
        })
        .await
    }

    fn check_status(
        &self,
        url: &str,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, BigCommerceError> {
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(30);

            return Err(BigCommerceError::RateLimited {
                store_hash: self.credentials.store_hash.clone(),
                retry_after_secs,
            });
        }

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(BigCommerceError::NotFound {
                url: url.to_owned(),
            });
        }

        if !status.is_success() {
            return Err(BigCommerceError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_owned(),
            });
        }

        Ok(response)
    }
}
