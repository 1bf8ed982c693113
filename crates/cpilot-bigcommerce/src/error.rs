use thiserror::Error;

#[derive(Debug, Error)]
pub enum BigCommerceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("rate limited by store {store_hash} (retry after {retry_after_secs}s)")]
    RateLimited {
        store_hash: String,
        retry_after_secs: u64,
    },

    #[error("endpoint not found: {url}")]
    NotFound { url: String },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("pagination limit reached for store {store_hash}: exceeded {max_pages} pages")]
    PaginationLimit { store_hash: String, max_pages: usize },
}
