//! Client configuration: models, credentials, data directory and runtime knobs.
//!
//! Loaded from YAML or JSON, with environment fallbacks:
//! - `DATA_DIR` for the data directory (default `./data`),
//! - API keys from the config file, then the OS keyring
//!   (service `worksheet-runtime`, user = provider id), then `{PROVIDER}_API_KEY`.

use keyring::Entry;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::compiler::EvalLimits;
use crate::error::{Error, ErrorContext};
use crate::models::{resolve_model, ModelConfig, Provider, DEFAULT_GENERATION_MODEL, DEFAULT_VALIDATION_MODEL};
use crate::query::RetryPolicy;

const KEYRING_SERVICE: &str = "worksheet-runtime";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeys {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gemini: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anthropic: Option<String>,
}

impl ApiKeys {
    pub fn get(&self, provider: Provider) -> Option<&str> {
        let key = match provider {
            Provider::OpenAi => &self.openai,
            Provider::Gemini => &self.gemini,
            Provider::Anthropic => &self.anthropic,
        };
        key.as_deref().filter(|k| !k.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientConfig {
    pub generation_model: String,
    pub validation_model: String,
    pub api_keys: ApiKeys,
    pub data_dir: PathBuf,
    pub retry: RetryPolicy,
    pub limits: EvalLimits,
    /// Point every provider at one base URL (mock servers, gateways).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url_override: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            generation_model: DEFAULT_GENERATION_MODEL.to_string(),
            validation_model: DEFAULT_VALIDATION_MODEL.to_string(),
            api_keys: ApiKeys::default(),
            data_dir: PathBuf::from("./data"),
            retry: RetryPolicy::default(),
            limits: EvalLimits::default(),
            base_url_override: None,
        }
    }
}

impl ClientConfig {
    /// Defaults plus `DATA_DIR` from the environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Load a `.yaml`/`.yml` or `.json` file, then apply environment fallbacks.
    pub fn from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let mut config: ClientConfig = match ext {
            "yaml" | "yml" => serde_yaml::from_str(&text).map_err(|e| {
                Error::configuration_with_context(
                    format!("Invalid YAML config: {}", e),
                    ErrorContext::new()
                        .with_details(path.display().to_string())
                        .with_source("config_loader"),
                )
            })?,
            "json" => serde_json::from_str(&text)?,
            other => {
                return Err(Error::configuration_with_context(
                    format!("Unsupported config format '{}'", other),
                    ErrorContext::new()
                        .with_details(path.display().to_string())
                        .with_source("config_loader"),
                ))
            }
        };
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(dir) = env::var("DATA_DIR") {
            if !dir.is_empty() {
                self.data_dir = PathBuf::from(dir);
            }
        }
    }

    /// Directory holding the response cache files.
    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("llm")
    }

    /// API key for a provider: config file, then keyring, then environment.
    pub fn api_key(&self, provider: Provider) -> Option<String> {
        if let Some(key) = self.api_keys.get(provider) {
            return Some(key.to_string());
        }
        if let Ok(entry) = Entry::new(KEYRING_SERVICE, provider.as_str()) {
            if let Ok(key) = entry.get_password() {
                return Some(key);
            }
        }
        let env_var = format!("{}_API_KEY", provider.as_str().to_uppercase());
        env::var(env_var).ok().filter(|k| !k.is_empty())
    }

    /// Resolve a model id and its credential into a [`ModelConfig`].
    pub fn model_config(&self, model: &str) -> crate::Result<ModelConfig> {
        let (provider, _) = resolve_model(model)?;
        let key = self.api_key(provider).ok_or_else(|| {
            Error::configuration_with_context(
                format!("No API key available for model {}", model),
                ErrorContext::new()
                    .with_field_path(format!("apiKeys.{}", provider))
                    .with_source("config"),
            )
        })?;
        Ok(ModelConfig::new(model, key))
    }

    pub fn generation_model_config(&self) -> crate::Result<ModelConfig> {
        self.model_config(&self.generation_model)
    }

    pub fn validation_model_config(&self) -> crate::Result<ModelConfig> {
        self.model_config(&self.validation_model)
    }
}
