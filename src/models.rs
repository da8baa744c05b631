//! Model catalog and per-query model configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, ErrorContext};

/// Provider family; selects the driver used to talk to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Gemini,
    Anthropic,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Gemini => "gemini",
            Provider::Anthropic => "anthropic",
        }
    }

    pub fn all() -> [Provider; 3] {
        [Provider::OpenAi, Provider::Gemini, Provider::Anthropic]
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "gemini" | "google" => Ok(Provider::Gemini),
            "anthropic" | "claude" => Ok(Provider::Anthropic),
            other => Err(Error::configuration_with_context(
                format!("Unknown model provider '{}'", other),
                ErrorContext::new().with_source("model_catalog"),
            )),
        }
    }
}

/// Catalog entry for a known model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub provider: Provider,
}

pub const MODEL_CATALOG: &[ModelInfo] = &[
    ModelInfo { id: "gpt-4-turbo", name: "GPT-4 Turbo", provider: Provider::OpenAi },
    ModelInfo { id: "gpt-4o-mini", name: "GPT-4 Mini", provider: Provider::OpenAi },
    ModelInfo { id: "gpt-4o", name: "GPT-4", provider: Provider::OpenAi },
    ModelInfo { id: "gpt-3.5-turbo", name: "GPT-3.5 Turbo", provider: Provider::OpenAi },
    ModelInfo { id: "gemini-pro", name: "Gemini Pro", provider: Provider::Gemini },
    ModelInfo { id: "gemini-pro-vision", name: "Gemini Pro Vision", provider: Provider::Gemini },
    ModelInfo { id: "gemini-1.5-flash-001", name: "Gemini Flash 001", provider: Provider::Gemini },
    ModelInfo { id: "gemini-1.5-flash-002", name: "Gemini Flash 002", provider: Provider::Gemini },
    ModelInfo { id: "gemini-1.5-flash-latest", name: "Gemini Flash Latest", provider: Provider::Gemini },
    ModelInfo { id: "gemini-1.5-flash-8b", name: "Gemini Flash 8B", provider: Provider::Gemini },
    ModelInfo { id: "claude-3-haiku-20240307", name: "Claude 3 Haiku", provider: Provider::Anthropic },
    ModelInfo { id: "claude-3-5-sonnet-20241022", name: "Claude 3.5 Sonnet", provider: Provider::Anthropic },
];

pub const DEFAULT_GENERATION_MODEL: &str = "claude-3-5-sonnet-20241022";
pub const DEFAULT_VALIDATION_MODEL: &str = "gemini-1.5-flash-latest";

pub fn lookup_model(id: &str) -> Option<&'static ModelInfo> {
    MODEL_CATALOG.iter().find(|m| m.id == id)
}

/// Resolve a model identifier to `(provider, provider-side model id)`.
///
/// Catalog ids resolve directly; anything else must be provider-qualified,
/// e.g. `anthropic/claude-3-opus-20240229`.
pub fn resolve_model(id: &str) -> crate::Result<(Provider, String)> {
    if let Some(info) = lookup_model(id) {
        return Ok((info.provider, info.id.to_string()));
    }
    if let Some((provider, model)) = id.split_once('/') {
        if !model.is_empty() {
            return Ok((provider.parse()?, model.to_string()));
        }
    }
    Err(Error::configuration_with_context(
        format!("Unknown model provider for model {}", id),
        ErrorContext::new()
            .with_field_path("model")
            .with_source("model_catalog"),
    ))
}

/// Target model plus the credential used for it. Immutable once a query is built.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    pub model: String,
    pub api_key: String,
}

impl ModelConfig {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            api_key: api_key.into(),
        }
    }

    pub fn provider(&self) -> crate::Result<Provider> {
        resolve_model(&self.model).map(|(p, _)| p)
    }
}

// Keep credentials out of logs.
impl fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelConfig")
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .finish()
    }
}
