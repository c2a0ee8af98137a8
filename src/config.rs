use std::env;
use std::time::Duration;

use dotenvy::dotenv;

/// Environment variable holding the comma-separated upstream API keys
pub const API_KEYS_ENV: &str = "ZAI_API_KEY";

pub struct Config {
    /// Upstream credentials, in rotation order
    pub api_keys: Vec<String>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let api_keys = env::var(API_KEYS_ENV)
            .map(|raw| parse_key_list(&raw))
            .unwrap_or_default();

        Self { api_keys }
    }
}

/// Split a comma-separated key list, dropping blanks but keeping order.
pub fn parse_key_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

/// `0` disables the per-request timeout.
pub fn request_timeout(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}
