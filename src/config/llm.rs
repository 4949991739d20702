//! LLM classifier configuration.

use serde::{Deserialize, Serialize};

/// LLM provider type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Ollama local inference (default).
    #[default]
    Ollama,
    /// OpenAI-compatible chat completions API.
    OpenAi,
}

/// Configuration for the LLM material classifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProvider,
    /// API endpoint (Ollama: http://localhost:11434, OpenAI: https://api.openai.com)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// API key (OpenAI-compatible providers only).
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    /// Maximum tokens in response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Temperature for generation (0.0 - 1.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Request timeout in seconds; on expiry rules take over.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Maximum characters of snapshot context sent to the model.
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
}

fn default_endpoint() -> String {
    "http://localhost:11434".to_string()
}
fn default_model() -> String {
    "llama3.2:instruct".to_string()
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_temperature() -> f32 {
    0.0
}
fn default_timeout() -> u64 {
    60
}
fn default_max_context_chars() -> usize {
    16000
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            endpoint: default_endpoint(),
            api_key: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout: default_timeout(),
            max_context_chars: default_max_context_chars(),
        }
    }
}

impl LlmConfig {
    /// Apply environment overrides (`LLM_ENDPOINT`, `LLM_MODEL`, `LLM_API_KEY`).
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("LLM_ENDPOINT") {
            if !val.is_empty() {
                self.endpoint = val;
            }
        }
        if let Ok(val) = std::env::var("LLM_MODEL") {
            if !val.is_empty() {
                self.model = val;
            }
        }
        if let Ok(val) = std::env::var("LLM_API_KEY") {
            if !val.is_empty() {
                self.api_key = Some(val);
            }
        }
        self
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }
}
