use crate::client::consts::{BASE_URL, DEFAULT_MODEL, GEMINI_API_KEY, SYSTEM_INSTRUCTIONS};
use secrecy::SecretString;
use voice_snake_types::audio::Voice;

pub struct Config {
    base_url: String,
    api_key: SecretString,
    model: String,
    voice: Voice,
    instructions: String,
}

pub struct ConfigBuilder {
    config: Config,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.config.base_url = base_url.to_string();
        self
    }

    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.config.api_key = SecretString::from(api_key.to_string());
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.config.model = model.to_string();
        self
    }

    pub fn with_voice(mut self, voice: Voice) -> Self {
        self.config.voice = voice;
        self
    }

    pub fn with_instructions(mut self, instructions: &str) -> Self {
        self.config.instructions = instructions.to_string();
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    // Defaults; the API key falls back to the environment.
    pub fn new() -> Self {
        Self {
            base_url: BASE_URL.to_string(),
            api_key: std::env::var(GEMINI_API_KEY)
                .unwrap_or_default()
                .into(),
            model: DEFAULT_MODEL.to_string(),
            voice: Voice::Puck,
            instructions: SYSTEM_INSTRUCTIONS.to_string(),
        }
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_key(&self) -> &SecretString {
        &self.api_key
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn voice(&self) -> &Voice {
        &self.voice
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }
}
