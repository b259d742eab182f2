//! Request and response types shared by all provider adapters.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Supported upstream LLM providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Anthropic,
    Gemini,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::OpenAi, Provider::Anthropic, Provider::Gemini];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "gemini" => Ok(Self::Gemini),
            _ => Err(format!("Unknown provider: {s}")),
        }
    }
}

/// Page context captured by the extension at the moment of the request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Generation tuning knobs, all optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

impl GenerationOptions {
    pub fn max_tokens_or_default(&self) -> u32 {
        self.max_tokens.unwrap_or(512)
    }

    pub fn temperature_or_default(&self) -> f64 {
        self.temperature.unwrap_or(0.7)
    }
}

/// A generation request as submitted by the extension.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationRequest {
    pub model: String,
    pub provider: Provider,
    pub prompt: String,
    #[serde(default)]
    pub context: Option<RequestContext>,
    #[serde(default)]
    pub options: Option<GenerationOptions>,
    #[serde(default = "default_true")]
    pub use_user_key: bool,
    #[serde(default)]
    pub stream: bool,
}

const fn default_true() -> bool {
    true
}

impl GenerationRequest {
    pub fn options_or_default(&self) -> GenerationOptions {
        self.options.clone().unwrap_or_default()
    }
}

/// A completed (non-streaming) generation.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationResponse {
    pub id: String,
    pub text: String,
    pub model: String,
    pub provider: Provider,
}
