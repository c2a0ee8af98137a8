use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Invalid body: {0}")]
    InvalidRequestBody(serde_json::Error),

    #[error("Invalid body: {0}")]
    UnreadableRequestBody(String),

    #[error("Connection error: {0}")]
    UpstreamConnection(#[from] reqwest::Error),

    #[error("Connection error: upstream did not respond within {0}s")]
    UpstreamTimeout(u64),

    #[error("{message}")]
    UpstreamRejected { status: StatusCode, message: String },

    #[error("Invalid response: {0}")]
    BadUpstreamResponse(String),

    #[error("Encode error: {0}")]
    Encoding(serde_json::Error),

    #[error("Configured API key cannot be sent as a header")]
    InvalidCredential,

    #[error("Not found")]
    NotFound,
}

/// Startup failures: bad configuration never reaches the request path.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("model tag {tag:?} must be one of {available:?}")]
    UnknownModel { tag: String, available: Vec<String> },

    #[error("at least one upstream API key is required (set ZAI_API_KEY)")]
    EmptyKeyPool,

    #[error("API key #{position} contains characters not allowed in an HTTP header")]
    UnencodableKey { position: usize },
}

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: &'static str,
    pub code: u16,
}

impl ErrorEnvelope {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                message: message.into(),
                error_type: "api_error",
                code: status.as_u16(),
            },
        }
    }
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::InvalidRequestBody(_) | ProxyError::UnreadableRequestBody(_) => {
                StatusCode::BAD_REQUEST
            }
            ProxyError::UpstreamConnection(_)
            | ProxyError::UpstreamTimeout(_)
            | ProxyError::BadUpstreamResponse(_) => StatusCode::BAD_GATEWAY,
            ProxyError::UpstreamRejected { status, .. } => *status,
            ProxyError::Encoding(_) | ProxyError::InvalidCredential => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ProxyError::NotFound => StatusCode::NOT_FOUND,
        }
    }

    /// Convert error to the OpenAI-style error envelope
    pub fn to_openai_response(&self) -> Response {
        let status = self.status();
        (status, Json(ErrorEnvelope::new(status, self.to_string()))).into_response()
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        self.to_openai_response()
    }
}
