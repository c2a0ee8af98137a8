/// Tag served when the client omits the model or asks for one we don't know
pub const DEFAULT_MODEL: &str = "glm-4.7-flash";

/// Coding-plan endpoint (requires a paid plan on z.ai)
pub const GLM_4_7_URL: &str = "https://api.z.ai/api/coding/paas/v4/chat/completions";

/// General endpoint, free tier
pub const GLM_4_7_FLASH_URL: &str = "https://api.z.ai/api/paas/v4/chat/completions";

/// Max output tokens accepted by both GLM 4.7 endpoints
pub const GLM_MAX_OUTPUT: i64 = 8192;

/// Built-in model registry: (tag, upstream URL, max-token ceiling)
pub static MODELS: &[(&str, &str, i64)] = &[
    ("glm-4.7", GLM_4_7_URL, GLM_MAX_OUTPUT),
    ("glm-4.7-flash", GLM_4_7_FLASH_URL, GLM_MAX_OUTPUT),
];

/// Client-side model names rewritten to a registered tag
pub static MODEL_ALIASES: &[(&str, &str)] = &[
    ("gpt-4", "glm-4.7"),
    ("gpt-4o", "glm-4.7"),
    ("gpt-4-turbo", "glm-4.7"),
    ("claude-3-sonnet", "glm-4.7"),
    ("gpt-3.5-turbo", "glm-4.7-flash"),
    ("gpt-4o-mini", "glm-4.7-flash"),
    ("claude-3-haiku", "glm-4.7-flash"),
];

/// `owned_by` reported on `/v1/models`
pub const MODEL_OWNER: &str = "zhipuai";

/// Fixed `created` timestamp reported on `/v1/models`
pub const MODEL_CREATED: i64 = 1_700_000_000;

/// Upper bound on `max_tokens` when the client didn't send a usable value
pub const DEFAULT_MAX_TOKENS: i64 = 4096;

pub const DEFAULT_TEMPERATURE: f64 = 0.7;

/// Fields the upstream sometimes places on the choice instead of the message/delta
pub static MESSAGE_LEVEL_FIELDS: &[&str] = &[
    "tool_calls",
    "function_call",
    "reasoning_content",
    "metadata",
    "audio",
    "mcp_calls",
    "mcp_metadata",
];

/// Prefix of generated completion ids
pub const CHAT_ID_PREFIX: &str = "chatcmpl-";

/// Length of the random suffix after [`CHAT_ID_PREFIX`]
pub const CHAT_ID_SUFFIX_LEN: usize = 29;

/// End-of-stream sentinel, both upstream and towards the client
pub const STREAM_DONE: &str = "[DONE]";

/// Largest upstream error body (or single SSE line) we are willing to buffer
pub const MAX_BUFFERED_BYTES: usize = 1 << 20;
