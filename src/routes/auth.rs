use axum::http::{HeaderMap, HeaderValue, header};
use reqwest::{Client, RequestBuilder};

use crate::auth::KeyRotator;
use crate::error::ProxyError;

/// Pick the `Authorization` value for the upstream call.
///
/// A client-supplied header is forwarded verbatim; otherwise the next pooled
/// key is used as a bearer token.
pub fn resolve_authorization(
    headers: &HeaderMap,
    keys: &KeyRotator,
) -> Result<HeaderValue, ProxyError> {
    if let Some(value) = headers
        .get(header::AUTHORIZATION)
        .filter(|v| !v.as_bytes().iter().all(u8::is_ascii_whitespace))
    {
        return Ok(value.clone());
    }

    let mut value = HeaderValue::from_str(&format!("Bearer {}", keys.next()))
        .map_err(|_| ProxyError::InvalidCredential)?;
    value.set_sensitive(true);
    Ok(value)
}

/// Build a chat completion request to the GLM API
pub fn build_upstream_request(
    client: &Client,
    url: &str,
    authorization: HeaderValue,
    payload: Vec<u8>,
    stream: bool,
) -> RequestBuilder {
    let accept = if stream {
        "text/event-stream"
    } else {
        "application/json"
    };

    client
        .post(url)
        .header(header::AUTHORIZATION, authorization)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::ACCEPT, accept)
        .body(payload)
}
