//! Request/response transformations between OpenAI clients and the GLM API.
//!
//! This module provides:
//! - `common`: JSON document parsing, lenient field coercions, id generation
//! - `prepare`: Rewrite an inbound chat request for the upstream
//! - `openai_compat`: Normalize upstream responses and chunks to OpenAI shape
//! - `streaming`: SSE stream transcoding

pub mod common;
pub mod openai_compat;
pub mod prepare;
pub mod streaming;

// Re-export commonly used items
pub use common::parse_document;
pub use openai_compat::normalize_response;
pub use prepare::prepare_chat_request;
pub use streaming::transcode_stream;
