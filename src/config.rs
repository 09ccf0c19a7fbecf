//! Process configuration loaded from the environment.

use crate::client::{Config, DEFAULT_MODEL, GEMINI_API_KEY};
use secrecy::{ExposeSecret, SecretString};
use std::str::FromStr;
use tracing_subscriber::EnvFilter;
use voice_snake_types::audio::Voice;

pub const GEMINI_MODEL: &str = "GEMINI_MODEL";
pub const GEMINI_VOICE: &str = "GEMINI_VOICE";
pub const RUST_LOG: &str = "RUST_LOG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

#[derive(Debug)]
pub struct AppConfig {
    pub gemini_api_key: Option<SecretString>,
    pub model: String,
    pub voice: Voice,
    pub log_filter: String,
}

impl AppConfig {
    /// Loads `.env` if present, then reads:
    ///
    /// *   `GEMINI_API_KEY`: required when `require_api_key` is set.
    /// *   `GEMINI_MODEL`: (Optional) defaults to the Live API flash model.
    /// *   `GEMINI_VOICE`: (Optional) prebuilt voice name, defaults to "Puck".
    /// *   `RUST_LOG`: (Optional) log filter directives, defaults to "info".
    pub fn from_env(require_api_key: bool) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok(), require_api_key)
    }

    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        require_api_key: bool,
    ) -> Result<Self, ConfigError> {
        let gemini_api_key = lookup(GEMINI_API_KEY)
            .filter(|key| !key.trim().is_empty())
            .map(SecretString::from);
        if require_api_key && gemini_api_key.is_none() {
            return Err(ConfigError::MissingVar(format!(
                "{} must be set for voice control (or pass --keyboard-only)",
                GEMINI_API_KEY
            )));
        }

        let model = lookup(GEMINI_MODEL).unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let voice = lookup(GEMINI_VOICE)
            .map(|name| Voice::from_str(&name).unwrap_or_else(|never| match never {}))
            .unwrap_or(Voice::Puck);

        let log_filter = lookup(RUST_LOG).unwrap_or_else(|| "info".to_string());
        EnvFilter::try_new(&log_filter).map_err(|e| {
            ConfigError::InvalidValue(RUST_LOG.to_string(), format!("'{}': {}", log_filter, e))
        })?;

        Ok(Self {
            gemini_api_key,
            model,
            voice,
            log_filter,
        })
    }

    /// Session configuration for the Live API, if a key is available.
    pub fn session_config(&self) -> Option<Config> {
        let api_key = self.gemini_api_key.as_ref()?;
        Some(
            Config::builder()
                .with_api_key(api_key.expose_secret())
                .with_model(&self.model)
                .with_voice(self.voice.clone())
                .build(),
        )
    }
}
