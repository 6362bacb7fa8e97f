//! HTTP plumbing shared by the providers.

use std::time::Duration;

use tracing::warn;

use crate::error::{ProviderError, Result};

/// Build a client with a whole-request timeout.
pub(crate) fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "failed to build HTTP client with timeout, using defaults");
            reqwest::Client::new()
        })
}

/// Turn a non-success response into the matching [`ProviderError`].
///
/// Success responses are passed through untouched.
pub(crate) async fn error_for_status(provider: &str, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status.as_u16() == 429 {
        let header_ms = parse_retry_after_header(&response);
        let body = response.text().await.unwrap_or_default();
        let retry_after_ms = header_ms.or_else(|| parse_retry_after_ms(&body)).unwrap_or(0);
        warn!(provider, retry_after_ms, "rate limited");
        return Err(ProviderError::RateLimited { retry_after_ms });
    }

    let body = response.text().await.unwrap_or_default();

    if status.as_u16() == 401 || status.as_u16() == 403 {
        return Err(ProviderError::AuthFailed(extract_error_message(&body).unwrap_or(body)));
    }

    Err(ProviderError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Extract a human-readable error message from a JSON error response body.
fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    error
        .get("message")
        .and_then(|m| m.as_str())
        .map(String::from)
        .or_else(|| error.as_str().map(String::from))
}

/// Read the numeric form of the `Retry-After` header (seconds).
fn parse_retry_after_header(response: &reqwest::Response) -> Option<u64> {
    let header_val = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())?;

    let secs = header_val.trim().parse::<f64>().ok()?;
    Some((secs * 1000.0).max(0.0) as u64)
}

/// Some providers put the hint in the JSON error body instead.
fn parse_retry_after_ms(body: &str) -> Option<u64> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value.get("retry_after_ms").and_then(|v| v.as_u64()).or_else(|| {
        value
            .get("retry_after")
            .and_then(|v| v.as_f64())
            .map(|secs| (secs * 1000.0) as u64)
    })
}
