//! HTTP retry helpers for transient errors.
//!
//! Every request to the county service goes through [`send_json`] or
//! [`send`] so that timeouts, connection resets, rate limiting and server
//! errors are retried with exponential backoff. Job polling has its own
//! schedule in [`crate::job`]; this only covers a single logical request.
//!
//! ```ignore
//! let body = retry::send_json(|| client.get(&url).query(&params)).await?;
//! let body = retry::send_json(|| client.post(&url).form(&form)).await?;
//! ```

use std::time::Duration;

use crate::ExtractError;

/// Maximum number of retry attempts for a transient failure.
///
/// Backoff is 2s, 4s, 8s.
const MAX_RETRIES: u32 = 3;

/// Maximum length of the response body preview included in error logs.
const BODY_PREVIEW_LEN: usize = 500;

/// Sends an HTTP request and parses the response body as JSON.
///
/// The `build_request` closure is called on each attempt to construct a
/// fresh [`reqwest::RequestBuilder`], since builders are consumed by
/// `.send()`.
///
/// A body that arrives but cannot be read is re-fetched up to
/// [`MAX_RETRIES`] times. A body that is read but is not JSON is a
/// protocol error and is not retried.
///
/// # Errors
///
/// Returns [`ExtractError`] if the request fails after all retries, the
/// server returns a non-retryable status code, or the body is not JSON.
#[allow(clippy::future_not_send)]
pub async fn send_json<F>(build_request: F) -> Result<serde_json::Value, ExtractError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut body_attempt = 0;
    loop {
        let response = send(&build_request).await?;
        let url = response.url().to_string();
        let status = response.status();

        match response.text().await {
            Ok(text) => {
                return serde_json::from_str(&text).map_err(|e| {
                    let preview: String = text.chars().take(BODY_PREVIEW_LEN).collect();
                    log::error!(
                        "JSON parse failed\n  \
                         url: {url}\n  \
                         status: {status}\n  \
                         received: {} bytes\n  \
                         parse error: {e}\n  \
                         body preview: {preview}",
                        text.len(),
                    );
                    ExtractError::Json(e)
                });
            }
            Err(e) if body_attempt < MAX_RETRIES => {
                body_attempt += 1;
                let delay = backoff(body_attempt);
                log::warn!(
                    "Response body read failed (body retry {body_attempt}/{MAX_RETRIES}), \
                     re-fetching in {delay:?}...\n  \
                     url: {url}\n  \
                     error: {e}",
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(ExtractError::Http(e)),
        }
    }
}

/// Sends the request built by `build_request`, retrying on transient
/// errors up to [`MAX_RETRIES`] times with exponential backoff.
///
/// Returns the successful [`reqwest::Response`] (status 2xx or 3xx)
/// without reading its body.
///
/// # Errors
///
/// Returns [`ExtractError::Http`] for transport failures that outlast
/// the retries and [`ExtractError::HttpStatus`] for error statuses.
#[allow(clippy::future_not_send)]
pub async fn send<F>(build_request: &F) -> Result<reqwest::Response, ExtractError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut attempt = 0;
    loop {
        if attempt > 0 {
            let delay = backoff(attempt);
            log::warn!("  retry {attempt}/{MAX_RETRIES} in {delay:?}...");
            tokio::time::sleep(delay).await;
        }

        match build_request().send().await {
            Err(e) => {
                if is_transient(&e) && attempt < MAX_RETRIES {
                    log::warn!("  transient error: {e}");
                    attempt += 1;
                    continue;
                }
                return Err(ExtractError::Http(e));
            }
            Ok(response) => {
                let status = response.status();

                if is_retryable_status(status) && attempt < MAX_RETRIES {
                    log::warn!("  HTTP {status} from {}", response.url());
                    attempt += 1;
                    continue;
                }

                if status.is_client_error() || status.is_server_error() {
                    return Err(ExtractError::HttpStatus {
                        url: response.url().to_string(),
                        status: status.as_u16(),
                    });
                }

                return Ok(response);
            }
        }
    }
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << attempt)
}

/// 429 and 5xx are worth another try; other 4xx are permanent.
fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_decode() || e.is_request()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles() {
        assert_eq!(backoff(1), Duration::from_secs(2));
        assert_eq!(backoff(2), Duration::from_secs(4));
        assert_eq!(backoff(3), Duration::from_secs(8));
    }

    #[test]
    fn only_rate_limits_and_server_errors_are_retried() {
        assert!(is_retryable_status(reqwest::StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(reqwest::StatusCode::BAD_GATEWAY));
        assert!(is_retryable_status(reqwest::StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_retryable_status(reqwest::StatusCode::NOT_FOUND));
        assert!(!is_retryable_status(reqwest::StatusCode::BAD_REQUEST));
        assert!(!is_retryable_status(reqwest::StatusCode::OK));
    }
}
