//! Shared helpers for working with JSON documents without a fixed schema.
//!
//! Every lenient conversion the proxy applies to client or upstream fields
//! lives here, so the fallback rules are stated once.

use rand::Rng;
use serde::de::Error as _;
use serde_json::{Map, Value};

use crate::constants::{CHAT_ID_PREFIX, CHAT_ID_SUFFIX_LEN};

/// A JSON object, in the order its keys arrived
pub type Document = Map<String, Value>;

const ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Parse a request or response body into a document.
///
/// Empty/whitespace bodies and a literal `null` become an empty object;
/// any other non-object JSON is an error.
pub fn parse_document(bytes: &[u8]) -> Result<Document, serde_json::Error> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Document::new());
    }
    match serde_json::from_slice::<Value>(bytes)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Document::new()),
        other => Err(serde_json::Error::custom(format!(
            "expected a JSON object, found {}",
            type_name(&other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

pub fn is_null_or_absent(value: Option<&Value>) -> bool {
    matches!(value, None | Some(Value::Null))
}

/// JSON bool, or `"true"/"1"/"false"/"0"` in any case.
pub fn coerce_bool(value: Option<&Value>) -> Option<bool> {
    match value? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Integer, float truncated toward zero, or a decimal string.
pub fn coerce_int(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Non-empty string, or a number rendered as a (truncated) integer.
pub fn coerce_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .map(|i| i.to_string()),
        _ => None,
    }
}

/// Borrow a non-empty object value, if that's what `value` is.
pub fn non_empty_object(value: Option<&Value>) -> Option<&Document> {
    value.and_then(Value::as_object).filter(|m| !m.is_empty())
}

/// Generate a completion id in OpenAI format: `chatcmpl-` + 29 `[a-z0-9]`.
pub fn generate_chat_id() -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..CHAT_ID_SUFFIX_LEN)
        .map(|_| ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())] as char)
        .collect();
    format!("{CHAT_ID_PREFIX}{suffix}")
}

pub fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}
