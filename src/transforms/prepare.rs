//! Prepare chat requests for the GLM API.
//!
//! The client body is forwarded as-is except for the handful of fields the
//! upstream requires:
//! - `model` forced to the resolved tag
//! - `stream` coerced to a real boolean
//! - `messages` and `temperature` defaulted when missing
//! - `max_tokens` clamped to the model's ceiling

use serde_json::{Value, json};

use super::common::{Document, coerce_bool, coerce_int, coerce_text, is_null_or_absent};
use crate::constants::{DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};
use crate::models::{ModelProfile, ModelRegistry};

/// Result of preparing a chat request for the upstream.
pub struct PreparedRequest<'a> {
    /// The rewritten request body
    pub body: Document,
    /// Profile serving this request (its tag is the effective model)
    pub profile: &'a ModelProfile,
    pub stream: bool,
    /// Model name exactly as the client sent it, when it was usable text
    pub requested_model: Option<String>,
}

/// Resolve the model and apply every rewrite step.
pub fn prepare_chat_request(mut body: Document, registry: &ModelRegistry) -> PreparedRequest<'_> {
    let requested_model = coerce_text(body.get("model"));
    let profile = registry.resolve(requested_model.as_deref());
    let stream = rewrite_request(&mut body, profile);

    PreparedRequest {
        body,
        profile,
        stream,
        requested_model,
    }
}

/// Rewrite `body` in place for `profile`; returns the effective stream flag.
///
/// Each step is idempotent, and fields not listed here are left untouched.
pub fn rewrite_request(body: &mut Document, profile: &ModelProfile) -> bool {
    body.insert("model".to_string(), Value::String(profile.tag.clone()));

    let stream = coerce_bool(body.get("stream")).unwrap_or(false);
    body.insert("stream".to_string(), Value::Bool(stream));

    ensure_messages(body);
    ensure_temperature(body);

    let max_tokens = clamp_max_tokens(body.get("max_tokens"), profile.max_tokens);
    body.insert("max_tokens".to_string(), json!(max_tokens));

    stream
}

/// A missing conversation is forwarded empty; the upstream decides if that's an error.
fn ensure_messages(body: &mut Document) {
    if is_null_or_absent(body.get("messages")) {
        body.insert("messages".to_string(), Value::Array(Vec::new()));
    }
}

fn ensure_temperature(body: &mut Document) {
    if is_null_or_absent(body.get("temperature")) {
        body.insert("temperature".to_string(), json!(DEFAULT_TEMPERATURE));
    }
}

/// Clamp a client-supplied `max_tokens` into `[1, ceiling]`.
///
/// Missing, unparsable and non-positive values become `min(4096, ceiling)`.
/// A non-positive ceiling yields `0`.
pub fn clamp_max_tokens(raw: Option<&Value>, ceiling: i64) -> i64 {
    if ceiling <= 0 {
        return 0;
    }
    let fallback = DEFAULT_MAX_TOKENS.min(ceiling);
    match coerce_int(raw) {
        Some(n) if n < 1 => fallback,
        Some(n) => n.min(ceiling),
        None => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{DEFAULT_MODEL, GLM_4_7_FLASH_URL};
    use crate::transforms::common::parse_document;

    fn registry() -> ModelRegistry {
        ModelRegistry::builtin(DEFAULT_MODEL).unwrap()
    }

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_clamp_identity_within_range() {
        for n in [1, 2, 100, 4096, 8191, 8192] {
            assert_eq!(clamp_max_tokens(Some(&json!(n)), 8192), n);
        }
    }

    #[test]
    fn test_clamp_caps_at_ceiling() {
        assert_eq!(clamp_max_tokens(Some(&json!(8193)), 8192), 8192);
        assert_eq!(clamp_max_tokens(Some(&json!(1_000_000)), 8192), 8192);
        assert_eq!(clamp_max_tokens(Some(&json!("9000")), 8192), 8192);
    }

    #[test]
    fn test_clamp_fallback_for_unusable_values() {
        assert_eq!(clamp_max_tokens(None, 8192), 4096);
        assert_eq!(clamp_max_tokens(Some(&Value::Null), 8192), 4096);
        assert_eq!(clamp_max_tokens(Some(&json!(0)), 8192), 4096);
        assert_eq!(clamp_max_tokens(Some(&json!(-5)), 8192), 4096);
        assert_eq!(clamp_max_tokens(Some(&json!("lots")), 8192), 4096);
        assert_eq!(clamp_max_tokens(Some(&json!(0)), 1000), 1000);
    }

    #[test]
    fn test_clamp_non_positive_ceiling() {
        assert_eq!(clamp_max_tokens(Some(&json!(100)), 0), 0);
        assert_eq!(clamp_max_tokens(None, -1), 0);
    }

    #[test]
    fn test_clamp_truncates_floats_and_parses_strings() {
        assert_eq!(clamp_max_tokens(Some(&json!(512.9)), 8192), 512);
        assert_eq!(clamp_max_tokens(Some(&json!(" 256 ")), 8192), 256);
    }

    #[test]
    fn test_minimal_request_gets_defaults() {
        let body = parse_document(
            br#"{"model":"glm-4.7-flash","messages":[{"role":"user","content":"hi"}]}"#,
        )
        .unwrap();
        let registry = registry();
        let prepared = prepare_chat_request(body, &registry);

        assert!(!prepared.stream);
        assert_eq!(prepared.profile.url, GLM_4_7_FLASH_URL);
        assert_eq!(prepared.body["model"], "glm-4.7-flash");
        assert_eq!(prepared.body["stream"], false);
        assert_eq!(prepared.body["temperature"], 0.7);
        assert!(prepared.body["max_tokens"].as_i64().unwrap() <= 4096);
        assert_eq!(prepared.body["messages"][0]["content"], "hi");
    }

    #[test]
    fn test_unknown_model_replaced_with_default() {
        let registry = registry();
        let prepared = prepare_chat_request(doc(json!({"model": "mystery"})), &registry);
        assert_eq!(prepared.profile.tag, DEFAULT_MODEL);
        assert_eq!(prepared.body["model"], DEFAULT_MODEL);
        assert_eq!(prepared.requested_model.as_deref(), Some("mystery"));
    }

    #[test]
    fn test_absent_model_uses_default() {
        let registry = registry();
        let prepared = prepare_chat_request(Document::new(), &registry);
        assert_eq!(prepared.body["model"], DEFAULT_MODEL);
        assert_eq!(prepared.requested_model, None);
        assert_eq!(prepared.body["messages"], json!([]));
    }

    #[test]
    fn test_stream_flag_coercion() {
        let profile = ModelProfile::new("m", "http://u", 8192);
        let cases = [
            (json!(true), true),
            (json!("true"), true),
            (json!("1"), true),
            (json!(false), false),
            (json!("nope"), false),
            (Value::Null, false),
        ];
        for (raw, expected) in cases {
            let mut body = doc(json!({"stream": raw}));
            assert_eq!(rewrite_request(&mut body, &profile), expected);
            assert_eq!(body["stream"], expected);
        }
    }

    #[test]
    fn test_explicit_values_preserved() {
        let profile = ModelProfile::new("m", "http://u", 8192);
        let mut body = doc(json!({
            "messages": [{"role": "system", "content": "be brief"}],
            "temperature": 0.1,
            "max_tokens": 300
        }));
        rewrite_request(&mut body, &profile);
        assert_eq!(body["temperature"], 0.1);
        assert_eq!(body["max_tokens"], 300);
        assert_eq!(body["messages"][0]["role"], "system");
    }

    #[test]
    fn test_null_fields_defaulted() {
        let profile = ModelProfile::new("m", "http://u", 8192);
        let mut body = doc(json!({"messages": null, "temperature": null}));
        rewrite_request(&mut body, &profile);
        assert_eq!(body["messages"], json!([]));
        assert_eq!(body["temperature"], 0.7);
    }

    #[test]
    fn test_other_fields_pass_through() {
        let profile = ModelProfile::new("m", "http://u", 8192);
        let tools = json!([{"type": "function", "function": {"name": "lookup"}}]);
        let mut body = doc(json!({
            "tools": tools,
            "tool_choice": "auto",
            "top_p": 0.9,
            "stop": ["\n"]
        }));
        rewrite_request(&mut body, &profile);
        assert_eq!(body["tools"], tools);
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["top_p"], 0.9);
        assert_eq!(body["stop"], json!(["\n"]));
    }

    #[test]
    fn test_rewrite_is_idempotent() {
        let profile = ModelProfile::new("m", "http://u", 2048);
        let mut body = doc(json!({"model": "x", "stream": "1", "max_tokens": 99999}));
        rewrite_request(&mut body, &profile);
        let once = body.clone();
        rewrite_request(&mut body, &profile);
        assert_eq!(body, once);
        assert_eq!(body["max_tokens"], 2048);
    }
}
