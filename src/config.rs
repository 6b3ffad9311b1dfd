use anyhow::{bail, Context, Result};

pub const DEFAULT_MODEL: &str = "gpt-4o-mini-2024-07-18";
pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Models known to support JSON-object responses, with their context size.
const KNOWN_MODELS: &[(&str, usize)] = &[
    ("gpt-4-1106-preview", 128_000),
    ("gpt-3.5-turbo-1106", 16_385),
    ("gpt-4o-2024-05-13", 128_000),
    ("gpt-4o-2024-08-06", 128_000),
    ("gpt-4o-mini-2024-07-18", 128_000),
];

/// Context size of a known model.
pub fn model_context_size(model: &str) -> Option<usize> {
    KNOWN_MODELS
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, size)| *size)
}

pub fn known_models() -> impl Iterator<Item = &'static str> {
    KNOWN_MODELS.iter().map(|(name, _)| *name)
}

#[derive(Debug, Clone)]
pub struct Config {
    // OpenAI
    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_api_url: String,
    pub openai_temperature: f32,
    pub request_timeout_secs: u64,

    // Input budget override; defaults to the model's context size
    pub max_input_tokens: Option<usize>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            openai_api_key: std::env::var("OPENAI_API_KEY").context("OPENAI_API_KEY not set")?,
            openai_model: std::env::var("OPENAI_MODEL")
                .unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            openai_api_url: std::env::var("OPENAI_API_URL")
                .unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            openai_temperature: std::env::var("OPENAI_TEMPERATURE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.2),
            request_timeout_secs: std::env::var("OPENAI_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
            max_input_tokens: std::env::var("MAX_INPUT_TOKENS")
                .ok()
                .and_then(|v| v.parse().ok()),
        })
    }

    /// Input budget per backend call.
    ///
    /// Unknown models are rejected unless an explicit budget is configured.
    pub fn input_budget(&self) -> Result<usize> {
        if let Some(limit) = self.max_input_tokens {
            return Ok(limit);
        }
        match model_context_size(&self.openai_model) {
            Some(size) => Ok(size),
            None => bail!(
                "Unknown model '{}'. Choose one of: {}, or set MAX_INPUT_TOKENS",
                self.openai_model,
                known_models().collect::<Vec<_>>().join(", ")
            ),
        }
    }
}
