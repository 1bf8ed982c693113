//! Retry with exponential backoff for transient BigCommerce API errors.
//!
//! 429 responses and network-level failures are retried; typed application
//! errors (404, unexpected statuses, parse failures) are propagated
//! immediately without retrying.

use std::future::Future;
use std::time::Duration;

use crate::error::BigCommerceError;

/// Returns `true` if `err` represents a transient condition that should be
/// retried after a backoff delay.
///
/// Retriable errors:
/// - [`BigCommerceError::RateLimited`] — HTTP 429; the API has asked us to back off.
/// - [`BigCommerceError::Http`] — network-level failure (connection reset, timeout, etc.).
///
/// Non-retriable errors (propagated immediately):
/// - [`BigCommerceError::NotFound`] — 404; retrying would return the same result.
/// - [`BigCommerceError::UnexpectedStatus`] — non-retriable HTTP status (e.g., 403, 422).
/// - [`BigCommerceError::Deserialize`] — response body does not parse; retrying won't fix it.
/// - [`BigCommerceError::PaginationLimit`] — guard against infinite loops; not transient.
fn is_retriable(err: &BigCommerceError) -> bool {
    matches!(
        err,
        BigCommerceError::RateLimited { .. } | BigCommerceError::Http(_)
    )
}

/// Executes `operation` with exponential backoff retries on transient errors.
///
/// On a retriable error the function sleeps for `backoff_base_secs * 2^attempt`
/// seconds and tries again, up to `max_retries` additional attempts after the
/// first try. A 429 carrying a `Retry-After` interval longer than the computed
/// backoff waits the advertised interval instead. If all retries are exhausted
/// the last error is returned. Non-retriable errors are returned immediately.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_secs: u64,
    mut operation: F,
) -> Result<T, BigCommerceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BigCommerceError>>,
{
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if is_retriable(&err) && attempt < max_retries => {
                let backoff_secs = backoff_base_secs.saturating_mul(1u64 << attempt.min(16));
                let sleep_secs = match &err {
                    BigCommerceError::RateLimited {
                        retry_after_secs, ..
                    } => backoff_secs.max(*retry_after_secs),
                    _ => backoff_secs,
                };
                tracing::warn!(
                    error = %err,
                    attempt = attempt + 1,
                    max_retries,
                    sleep_secs,
                    "transient BigCommerce error; backing off before retry"
                );
                tokio::time::sleep(Duration::from_secs(sleep_secs)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
