use axum::{
    Json,
    body::{Body, Bytes},
    extract::{State, rejection::BytesRejection},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures_util::StreamExt;
use serde_json::{Value, json};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::AppState;
use crate::constants::MAX_BUFFERED_BYTES;
use crate::error::ProxyError;
use crate::transforms::{
    normalize_response, parse_document, prepare_chat_request, transcode_stream,
};

use super::auth::{build_upstream_request, resolve_authorization};

pub async fn list_models(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "object": "list",
        "data": state.models.model_objects()
    }))
}

pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let start = Instant::now();
    let result = match body {
        Ok(body) => proxy_chat(&state, &headers, &body, start).await,
        Err(rejection) => Err(ProxyError::UnreadableRequestBody(rejection.body_text())),
    };
    match result {
        Ok(response) => response,
        Err(err @ ProxyError::UpstreamRejected { .. }) => err.to_openai_response(),
        Err(err) => {
            warn!(
                "chat completion failed: {} {} ({:.1}s)",
                err.status().as_u16(),
                err,
                start.elapsed().as_secs_f64()
            );
            err.to_openai_response()
        }
    }
}

async fn proxy_chat(
    state: &AppState,
    headers: &HeaderMap,
    raw: &[u8],
    start: Instant,
) -> Result<Response, ProxyError> {
    let body = parse_document(raw).map_err(ProxyError::InvalidRequestBody)?;
    let prepared = prepare_chat_request(body, &state.models);
    let model = prepared.profile.tag.clone();

    if let Some(requested) = &prepared.requested_model
        && *requested != model
    {
        debug!("{requested} -> {model}");
    }

    let payload = serde_json::to_vec(&prepared.body).map_err(ProxyError::Encoding)?;
    let authorization = resolve_authorization(headers, &state.keys)?;
    let deadline = state.timeout.map(|limit| (start + limit, limit));

    let request = build_upstream_request(
        &state.http_client,
        &prepared.profile.url,
        authorization,
        payload,
        prepared.stream,
    );
    let response = within(deadline, request.send()).await??;

    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        let raw = within(deadline, read_capped(response, MAX_BUFFERED_BYTES))
            .await
            .unwrap_or_default();
        warn!(
            "upstream {} ({:.1}s)",
            status.as_u16(),
            start.elapsed().as_secs_f64()
        );
        return Err(ProxyError::UpstreamRejected {
            status,
            message: upstream_error_message(status.as_u16(), &raw),
        });
    }

    if prepared.stream {
        // The deadline stops here: a live stream may run for as long as it needs
        let events = transcode_stream(response.bytes_stream(), model);
        return Ok((
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/event-stream"),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            Body::from_stream(events),
        )
            .into_response());
    }

    let raw = within(deadline, response.bytes()).await??;
    let normalized = normalize_response(&raw, &model)?;
    info!(
        "{} -> {} tok, {:.1}s",
        model,
        normalized.total_tokens,
        start.elapsed().as_secs_f64()
    );

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        normalized.body,
    )
        .into_response())
}

/// Await `fut`, bounded by the request deadline when one is configured.
async fn within<F: Future>(
    deadline: Option<(Instant, Duration)>,
    fut: F,
) -> Result<F::Output, ProxyError> {
    match deadline {
        Some((at, limit)) => tokio::time::timeout_at(at, fut)
            .await
            .map_err(|_| ProxyError::UpstreamTimeout(limit.as_secs())),
        None => Ok(fut.await),
    }
}

/// Read at most `limit` bytes of an upstream body; read errors end the body early.
async fn read_capped(response: reqwest::Response, limit: usize) -> Vec<u8> {
    let mut out = Vec::new();
    let mut body = response.bytes_stream();
    while let Some(Ok(chunk)) = body.next().await {
        let room = limit.saturating_sub(out.len());
        out.extend_from_slice(&chunk[..chunk.len().min(room)]);
        if out.len() >= limit {
            break;
        }
    }
    out
}

/// Prefer the upstream's own `error.message`, then its raw body, then a generic text.
pub fn upstream_error_message(status: u16, body: &[u8]) -> String {
    let from_envelope = serde_json::from_slice::<Value>(body).ok().and_then(|v| {
        v.get("error")
            .and_then(|e| e.get("message"))
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
    });
    if let Some(message) = from_envelope {
        return message;
    }

    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        format!("upstream error {status}")
    } else {
        text.to_string()
    }
}
