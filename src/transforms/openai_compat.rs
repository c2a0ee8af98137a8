//! OpenAI-compatible response shaping.
//!
//! The GLM API answers in nearly the OpenAI format, but fields go missing
//! and message-level data sometimes lands on the choice itself. These
//! helpers put every completion and stream chunk back into the exact shape
//! OpenAI clients expect.

use bytes::Bytes;
use serde_json::{Value, json};

use super::common::{
    Document, coerce_text, generate_chat_id, non_empty_object, now_secs, parse_document,
};
use crate::constants::MESSAGE_LEVEL_FIELDS;
use crate::error::ProxyError;

/// A completed, normalized non-streaming response.
#[derive(Debug)]
pub struct NormalizedResponse {
    pub body: Bytes,
    /// `usage.total_tokens` as text, `"?"` when the upstream didn't report it
    pub total_tokens: String,
}

/// Which sub-document a choice must carry after normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChoiceShape {
    Message,
    Delta,
}

impl ChoiceShape {
    fn key(self) -> &'static str {
        match self {
            ChoiceShape::Message => "message",
            ChoiceShape::Delta => "delta",
        }
    }

    /// The sub-document to fall back to when ours is missing or empty
    fn fallback_key(self) -> &'static str {
        match self {
            ChoiceShape::Message => "delta",
            ChoiceShape::Delta => "message",
        }
    }
}

/// Normalize a complete upstream response for the client.
pub fn normalize_response(raw: &[u8], model: &str) -> Result<NormalizedResponse, ProxyError> {
    let mut resp =
        parse_document(raw).map_err(|e| ProxyError::BadUpstreamResponse(e.to_string()))?;

    ensure_envelope(&mut resp, "chat.completion", model, generate_chat_id);

    let choices = take_field(&mut resp, "choices");
    let choices = match choice_objects(choices) {
        Some(list) if !list.is_empty() => normalize_choices(list, ChoiceShape::Message),
        _ => vec![default_choice()],
    };
    resp.insert("choices".to_string(), Value::Array(choices));

    let total_tokens = coerce_text(resp.get("usage").and_then(|u| u.get("total_tokens")))
        .unwrap_or_else(|| "?".to_string());

    let body = serde_json::to_vec(&resp).map_err(ProxyError::Encoding)?;

    Ok(NormalizedResponse {
        body: Bytes::from(body),
        total_tokens,
    })
}

/// Normalize one streamed chunk. `chat_id` is used when the chunk has no id.
pub fn normalize_stream_chunk(
    payload: &str,
    model: &str,
    chat_id: &str,
) -> Result<Document, serde_json::Error> {
    let mut chunk = parse_document(payload.as_bytes())?;

    ensure_envelope(&mut chunk, "chat.completion.chunk", model, || chat_id.to_string());

    let choices = choice_objects(take_field(&mut chunk, "choices"))
        .map(|list| normalize_choices(list, ChoiceShape::Delta))
        .unwrap_or_default();
    chunk.insert("choices".to_string(), Value::Array(choices));

    Ok(chunk)
}

/// Fill `id`, `object`, `created` when absent and pin `model`.
fn ensure_envelope(
    doc: &mut Document,
    object: &str,
    model: &str,
    make_id: impl FnOnce() -> String,
) {
    if !doc.contains_key("id") {
        doc.insert("id".to_string(), Value::String(make_id()));
    }
    if !doc.contains_key("object") {
        doc.insert("object".to_string(), Value::String(object.to_string()));
    }
    if !doc.contains_key("created") {
        doc.insert("created".to_string(), json!(now_secs()));
    }
    doc.insert("model".to_string(), Value::String(model.to_string()));
}

/// Take a field's value out, leaving `null` in its slot so key order survives.
fn take_field(doc: &mut Document, key: &str) -> Option<Value> {
    doc.get_mut(key).map(Value::take)
}

/// `Some` only for an array whose every element is an object.
fn choice_objects(value: Option<Value>) -> Option<Vec<Document>> {
    match value? {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect(),
        _ => None,
    }
}

fn normalize_choices(choices: Vec<Document>, shape: ChoiceShape) -> Vec<Value> {
    choices
        .into_iter()
        .enumerate()
        .map(|(position, choice)| Value::Object(normalize_choice(choice, position, shape)))
        .collect()
}

/// Normalize one choice into `shape`, dropping the other sub-document.
pub fn normalize_choice(mut choice: Document, position: usize, shape: ChoiceShape) -> Document {
    if !choice.contains_key("index") {
        choice.insert("index".to_string(), json!(position));
    }

    let mut message = non_empty_object(choice.get(shape.key()))
        .or_else(|| non_empty_object(choice.get(shape.fallback_key())))
        .cloned()
        .unwrap_or_default();
    choice.remove(shape.fallback_key());

    enforce_message_defaults(&mut message);
    hoist_message_fields(&mut choice, &mut message);

    choice.insert(shape.key().to_string(), Value::Object(message));
    choice
}

/// Every emitted message/delta has a non-empty `role` and a `content` key.
fn enforce_message_defaults(message: &mut Document) {
    let has_role = matches!(message.get("role"), Some(Value::String(r)) if !r.is_empty());
    if !has_role {
        message.insert("role".to_string(), Value::String("assistant".to_string()));
    }
    if !message.contains_key("content") {
        message.insert("content".to_string(), Value::String(String::new()));
    }
}

/// Move message-level fields off the choice; the message's own value wins.
fn hoist_message_fields(choice: &mut Document, message: &mut Document) {
    for field in MESSAGE_LEVEL_FIELDS {
        if let Some(value) = choice.remove(*field) {
            message.entry(*field).or_insert(value);
        }
    }
}

fn default_choice() -> Value {
    json!({
        "index": 0,
        "finish_reason": "stop",
        "message": {
            "role": "assistant",
            "content": ""
        }
    })
}
