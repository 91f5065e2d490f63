//! HTTP retry helper for transient errors.
//!
//! Upstream fetches go through [`send_text`] instead of calling
//! `reqwest::RequestBuilder::send()` directly, so every request gets
//! retried with exponential backoff on timeouts, connection resets, server
//! errors, and rate limiting.
//!
//! ```ignore
//! let csv = retry::send_text(|| client.get(&url), retry::MAX_RETRIES).await?;
//! ```

use std::time::Duration;

use crate::SourceError;

/// Default number of retry attempts for transient HTTP errors.
///
/// With exponential backoff (2s, 4s, 8s, 16s, 32s) the total wait before
/// giving up is 62 seconds.
pub const MAX_RETRIES: u32 = 5;

/// Sends an HTTP request and returns the response body as a `String`.
///
/// The `build_request` closure is called on each attempt to construct a
/// fresh [`reqwest::RequestBuilder`], since builders are consumed by
/// `.send()`.
///
/// Retries up to `max_retries` times on connection errors, timeouts,
/// HTTP 429, and HTTP 5xx. Does **not** retry other 4xx statuses, which
/// are permanent.
///
/// # Errors
///
/// Returns [`SourceError`] if the request fails after all retries, the
/// server returns a non-success status, or the body cannot be read.
#[allow(clippy::future_not_send)]
pub async fn send_text<F>(build_request: F, max_retries: u32) -> Result<String, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let response = send_inner(&build_request, max_retries).await?;
    let url = response.url().to_string();

    match response.text().await {
        Ok(text) => Ok(text),
        Err(e) => {
            log::error!("Failed to read response body from {url}: {e}");
            Err(SourceError::Http(e))
        }
    }
}

/// Core retry loop. Returns the first successful (2xx) response.
#[allow(clippy::future_not_send)]
async fn send_inner<F>(
    build_request: &F,
    max_retries: u32,
) -> Result<reqwest::Response, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_error: Option<SourceError> = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = backoff(attempt);
            log::warn!("  retry {attempt}/{max_retries} in {delay:?}...");
            tokio::time::sleep(delay).await;
        }

        match build_request().send().await {
            Err(e) => {
                if is_transient(&e) && attempt < max_retries {
                    log::warn!("  transient error: {e}");
                    last_error = Some(SourceError::Http(e));
                    continue;
                }
                return Err(SourceError::Http(e));
            }
            Ok(response) => {
                let status = response.status();
                let url = response.url().to_string();

                if status.is_success() {
                    return Ok(response);
                }

                let error = SourceError::Status {
                    url,
                    status: status.as_u16(),
                };

                if is_retryable_status(status) && attempt < max_retries {
                    log::warn!("  {error}");
                    last_error = Some(error);
                    continue;
                }

                return Err(error);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| SourceError::Status {
        url: String::new(),
        status: 0,
    }))
}

/// Delay before the `attempt`-th retry: 2s, 4s, 8s, ...
fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << attempt.min(6))
}

/// Returns `true` for statuses worth retrying (429 and 5xx).
fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_decode() || e.is_request()
}
