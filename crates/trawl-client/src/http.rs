use reqwest::{Response, StatusCode};
use trawl_core::error::AppError;

/// Map a reqwest transport error onto the crawl error taxonomy.
pub(crate) fn send_error(e: reqwest::Error, timeout_secs: u64) -> AppError {
    if e.is_timeout() {
        AppError::Timeout(timeout_secs)
    } else if e.is_connect() {
        AppError::NetworkError(format!("Connection failed: {e}"))
    } else if e.is_decode() || e.is_body() {
        AppError::NetworkError(format!("Failed to read response body: {e}"))
    } else {
        AppError::NetworkError(e.to_string())
    }
}

/// Classify a non-success status. 404 is left to the caller.
pub(crate) fn status_error(status: StatusCode, body: &str, url: &str) -> AppError {
    let status_code = status.as_u16();
    if status_code == 429 {
        return AppError::RateLimitExceeded;
    }

    let snippet: String = body.chars().take(200).collect();
    AppError::Upstream {
        message: format!("HTTP {status_code} for {url}: {snippet}"),
        status_code,
        retryable: status.is_server_error(),
    }
}

/// Read the body of a successful response as text.
pub(crate) async fn read_body(response: Response, timeout_secs: u64) -> Result<String, AppError> {
    response.text().await.map_err(|e| send_error(e, timeout_secs))
}
