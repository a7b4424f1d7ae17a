//! Shared request/response handling for the adapters.
//!
//! Every upstream failure is classified here into a [`ToolFailure`], so each
//! adapter reports errors the same way.

use log::{debug, warn};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use jingpt_common::{ToolErrorKind, ToolFailure};

use crate::shaping::truncate_chars;

const BODY_EXCERPT_CHARS: usize = 200;

/// Maps a non-success status to a failure.
///
/// `action` names what was attempted, e.g. `"SharePoint search"`.
#[must_use]
pub fn classify_status(status: StatusCode, body: &str, action: &str) -> ToolFailure {
    let (excerpt, _) = truncate_chars(body.trim(), BODY_EXCERPT_CHARS);
    let detail = if excerpt.is_empty() {
        format!("status {}", status.as_u16())
    } else {
        format!("status {}: {excerpt}", status.as_u16())
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ToolFailure::new(
            ToolErrorKind::Unauthorized,
            format!("{action} was rejected: the access token is invalid or expired. Please log in again."),
        ),
        StatusCode::NOT_FOUND => {
            ToolFailure::new(ToolErrorKind::NotFound, format!("{action}: resource not found"))
        }
        _ => ToolFailure::new(ToolErrorKind::HttpStatus, format!("{action} failed")),
    }
    .with_detail(detail)
}

fn network_failure(error: &reqwest::Error, action: &str) -> ToolFailure {
    ToolFailure::new(
        ToolErrorKind::Network,
        format!("{action} failed: could not reach the service"),
    )
    .with_detail(error.to_string())
}

/// Parse failure for a response that decoded but had the wrong shape.
#[must_use]
pub fn unexpected_shape(action: &str, detail: impl Into<String>) -> ToolFailure {
    ToolFailure::new(ToolErrorKind::Parse, format!("{action}: unexpected response")).with_detail(detail)
}

/// Sends `request`, returning the response only if the status is a success.
///
/// # Errors
/// Returns `network` on transport failure or the classified status failure.
pub async fn send(request: RequestBuilder, action: &str) -> Result<Response, ToolFailure> {
    let response = request.send().await.map_err(|e| {
        warn!("{action}: request failed: {e}");
        network_failure(&e, action)
    })?;

    let status = response.status();
    debug!("{action}: status {status}");
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    warn!("{action}: upstream returned {status}");
    Err(classify_status(status, &body, action))
}

/// Sends `request` and decodes the body as `T`.
///
/// # Errors
/// Returns the failures of [`send`], or `parse` if the body does not decode.
pub async fn fetch_json<T: DeserializeOwned>(
    request: RequestBuilder,
    action: &str,
) -> Result<T, ToolFailure> {
    let response = send(request, action).await?;
    let body = response.text().await.map_err(|e| network_failure(&e, action))?;
    serde_json::from_str(&body).map_err(|e| {
        warn!("{action}: could not decode response: {e}");
        ToolFailure::new(ToolErrorKind::Parse, format!("{action}: response was not valid JSON"))
            .with_detail(e.to_string())
    })
}

/// [`fetch_json`] into an untyped value.
///
/// # Errors
/// See [`fetch_json`].
pub async fn fetch_value(request: RequestBuilder, action: &str) -> Result<Value, ToolFailure> {
    fetch_json(request, action).await
}

/// Sends `request` and returns the raw body.
///
/// # Errors
/// See [`send`].
pub async fn fetch_bytes(request: RequestBuilder, action: &str) -> Result<Vec<u8>, ToolFailure> {
    let response = send(request, action).await?;
    let bytes = response.bytes().await.map_err(|e| network_failure(&e, action))?;
    Ok(bytes.to_vec())
}
