// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Everything is read once at startup; the resulting `Config` is immutable
//! and shared through `AppState`.

use std::env;
use std::time::Duration;

const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

/// Which document store backs the accessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// Cloud Firestore (or the emulator when FIRESTORE_EMULATOR_HOST is set).
    Firestore,
    /// In-process store; contents are lost on restart.
    Memory,
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Frontend URL allowed by CORS
    pub frontend_url: String,
    /// GCP project ID
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,
    /// Document store backend
    pub store_backend: StoreBackend,
    /// Gemini model identifier
    pub gemini_model: String,
    /// Base URL of the generative-language REST API
    pub gemini_base_url: String,
    /// Lifetime of access tokens
    pub access_token_ttl: Duration,
    /// Lifetime of refresh tokens
    pub refresh_token_ttl: Duration,
    /// Per-call timeout for completion requests
    pub completion_timeout: Duration,
    /// Maximum in-flight input-type classification calls per request
    pub classify_concurrency: usize,

    // --- Secrets ---
    /// Gemini API key (empty when not configured)
    pub gemini_api_key: String,
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// A `.env` file in the working directory is loaded first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let store_backend = match env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "firestore".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "firestore" => StoreBackend::Firestore,
            "memory" => StoreBackend::Memory,
            other => {
                return Err(ConfigError::Invalid {
                    name: "STORE_BACKEND",
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            store_backend,
            gemini_model: env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| DEFAULT_GEMINI_MODEL.to_string()),
            gemini_base_url: env::var("GEMINI_BASE_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| DEFAULT_GEMINI_BASE_URL.to_string()),
            access_token_ttl: lifetime_var("JWT_EXPIRE", "7d")?,
            refresh_token_ttl: lifetime_var("REFRESH_TOKEN_EXPIRE", "30d")?,
            completion_timeout: Duration::from_secs(
                env::var("COMPLETION_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
            ),
            classify_concurrency: env::var("CLASSIFY_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(4),

            // The key is trimmed so stray whitespace in .env files doesn't
            // turn into an "invalid key" error from the API.
            gemini_api_key: env::var("GEMINI_API_KEY")
                .map(|v| v.trim().to_string())
                .unwrap_or_default(),
            jwt_signing_key: env::var("JWT_SECRET")
                .map_err(|_| ConfigError::Missing("JWT_SECRET"))?
                .into_bytes(),
        })
    }

    /// Deterministic configuration for tests.
    pub fn test_default() -> Self {
        Self {
            frontend_url: "http://localhost:5173".to_string(),
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            store_backend: StoreBackend::Memory,
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            access_token_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            refresh_token_ttl: Duration::from_secs(30 * 24 * 60 * 60),
            completion_timeout: Duration::from_secs(5),
            classify_concurrency: 4,
            gemini_api_key: String::new(),
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
        }
    }
}

fn lifetime_var(name: &'static str, default: &str) -> Result<Duration, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    parse_lifetime(&raw).ok_or(ConfigError::Invalid { name, value: raw })
}

/// Parse a token lifetime such as `7d`, `12h`, `30m`, `45s`, or a bare
/// number of seconds.
pub fn parse_lifetime(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(split);
    let value: u64 = digits.parse().ok()?;

    let multiplier = match unit {
        "" | "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        _ => return None,
    };

    if value == 0 {
        return None;
    }

    value.checked_mul(multiplier).map(Duration::from_secs)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        env::set_var("JWT_SECRET", "test_jwt_key_32_bytes_minimum!!");
        env::set_var("JWT_EXPIRE", "12h");
        env::set_var("GEMINI_API_KEY", "  key-with-spaces \n");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.jwt_signing_key, b"test_jwt_key_32_bytes_minimum!!");
        assert_eq!(config.access_token_ttl, Duration::from_secs(12 * 60 * 60));
        assert_eq!(config.gemini_api_key, "key-with-spaces");
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_parse_lifetime_units() {
        assert_eq!(parse_lifetime("7d"), Some(Duration::from_secs(604_800)));
        assert_eq!(parse_lifetime("30m"), Some(Duration::from_secs(1_800)));
        assert_eq!(parse_lifetime("90"), Some(Duration::from_secs(90)));
        assert_eq!(parse_lifetime(" 2h "), Some(Duration::from_secs(7_200)));
    }

    #[test]
    fn test_parse_lifetime_rejects_garbage() {
        assert_eq!(parse_lifetime(""), None);
        assert_eq!(parse_lifetime("d"), None);
        assert_eq!(parse_lifetime("7w"), None);
        assert_eq!(parse_lifetime("0d"), None);
    }
}
