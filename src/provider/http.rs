//! HTTP plumbing shared by the built-in adapters.
//!
//! Every backend call goes through [`send`], which maps transport failures and
//! non-success statuses onto the three [`AdapterError`] variants:
//!
//! | condition | variant |
//! |-----------|---------|
//! | transport timeout, 408, 504 | `BackendTimeout` |
//! | connect failure, 401, 403, 429, other 5xx | `BackendUnavailable` |
//! | any other 4xx | `BackendRejected` (body excerpt as detail) |

use crate::error::{AdapterError, OcrError};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use tracing::debug;

/// Longest body excerpt carried into an error message.
const MAX_EXCERPT_CHARS: usize = 500;

/// Build the client an adapter uses for all its calls.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, OcrError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("edgequake-pdfocr/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| OcrError::InvalidConfig(format!("cannot build HTTP client: {e}")))
}

/// Send a request and classify any failure.
///
/// `what` names the call in logs and error details ("upload", "ocr", …).
pub async fn send(request: RequestBuilder, what: &str) -> Result<Response, AdapterError> {
    let start = Instant::now();
    let response = request
        .send()
        .await
        .map_err(|e| classify_transport(&e, start.elapsed(), what))?;

    let status = response.status();
    debug!(
        "{} → HTTP {} in {}ms",
        what,
        status.as_u16(),
        start.elapsed().as_millis()
    );
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status, &body, start.elapsed(), what))
}

/// Send a request and decode its JSON body.
pub async fn send_json<T: DeserializeOwned>(
    request: RequestBuilder,
    what: &str,
) -> Result<T, AdapterError> {
    let response = send(request, what).await?;
    let body = response
        .bytes()
        .await
        .map_err(|e| AdapterError::unavailable(format!("{what}: reading body failed: {e}")))?;
    parse_json(&body, what)
}

/// Decode a JSON body. An undecodable body is treated as a backend-side
/// fault: the request was accepted, the answer was not usable.
pub fn parse_json<T: DeserializeOwned>(body: &[u8], what: &str) -> Result<T, AdapterError> {
    serde_json::from_slice(body).map_err(|e| {
        AdapterError::unavailable(format!(
            "{what}: malformed response ({e}): {}",
            excerpt(&String::from_utf8_lossy(body))
        ))
    })
}

pub fn classify_transport(err: &reqwest::Error, elapsed: Duration, what: &str) -> AdapterError {
    if err.is_timeout() {
        AdapterError::BackendTimeout {
            elapsed_ms: elapsed.as_millis() as u64,
        }
    } else {
        AdapterError::unavailable(format!("{what}: {err}"))
    }
}

pub fn classify_status(
    status: StatusCode,
    body: &str,
    elapsed: Duration,
    what: &str,
) -> AdapterError {
    match status {
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => AdapterError::BackendTimeout {
            elapsed_ms: elapsed.as_millis() as u64,
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
            AdapterError::unavailable(format!("{what}: HTTP {}", status.as_u16()))
        }
        s if s.is_server_error() => AdapterError::unavailable(format!(
            "{what}: HTTP {}: {}",
            s.as_u16(),
            excerpt(body)
        )),
        s if s.is_client_error() => AdapterError::rejected(format!(
            "{what}: HTTP {}: {}",
            s.as_u16(),
            excerpt(body)
        )),
        s => AdapterError::unavailable(format!("{what}: unexpected HTTP {}", s.as_u16())),
    }
}

/// First [`MAX_EXCERPT_CHARS`] characters of `body`, whitespace-trimmed.
pub fn excerpt(body: &str) -> String {
    let body = body.trim();
    match body.char_indices().nth(MAX_EXCERPT_CHARS) {
        Some((cut, _)) => format!("{}…", &body[..cut]),
        None => body.to_string(),
    }
}
