use std::sync::atomic::{AtomicUsize, Ordering};

use axum::http::HeaderValue;

use crate::error::ConfigError;

/// Round-robin pool of upstream API keys.
///
/// The cursor is advanced with a single atomic read-modify-write, so
/// concurrent callers never observe the same position twice in a row and
/// never skip one.
#[derive(Debug)]
pub struct KeyRotator {
    keys: Vec<String>,
    cursor: AtomicUsize,
}

impl KeyRotator {
    pub fn new(keys: Vec<String>) -> Result<Self, ConfigError> {
        if keys.is_empty() || keys.iter().any(|k| k.is_empty()) {
            return Err(ConfigError::EmptyKeyPool);
        }
        if let Some(position) = keys
            .iter()
            .position(|k| HeaderValue::from_str(&format!("Bearer {k}")).is_err())
        {
            return Err(ConfigError::UnencodableKey {
                position: position + 1,
            });
        }
        Ok(Self {
            keys,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Return the key under the cursor and move the cursor one step, wrapping.
    pub fn next(&self) -> &str {
        let len = self.keys.len();
        // The closure always returns Some, so both arms carry the previous value
        let index = match self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |i| Some((i + 1) % len))
        {
            Ok(i) | Err(i) => i,
        };
        &self.keys[index]
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }
}
