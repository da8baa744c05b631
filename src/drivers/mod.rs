//! Provider 驱动抽象层 — 通过 trait 实现多厂商 API 适配的动态分发
//!
//! Provider driver abstraction layer. Each chat-completion API family
//! (OpenAI, Anthropic, Gemini) has a concrete driver that shapes the request
//! body and pulls the text back out of the response. Drivers are pure: the
//! HTTP round trip lives in [`crate::transport`].

pub mod anthropic;
pub mod gemini;
pub mod openai;

use serde_json::Value;
use std::collections::HashMap;

use crate::models::Provider;
use crate::types::message::Message;

pub use anthropic::AnthropicDriver;
pub use gemini::GeminiDriver;
pub use openai::OpenAiDriver;

/// Unified HTTP request representation for provider communication.
#[derive(Debug, Clone)]
pub struct DriverRequest {
    /// Fully resolved target URL.
    pub url: String,
    /// Request headers (content type is added by the transport).
    pub headers: HashMap<String, String>,
    /// Serialized JSON request body.
    pub body: Value,
}

/// Core trait for provider-specific API adaptation.
///
/// The trait is object-safe; the query builder holds a `Box<dyn ProviderDriver>`
/// chosen from the model's provider.
pub trait ProviderDriver: Send + Sync + std::fmt::Debug {
    /// Driver name used as context in error messages.
    fn name(&self) -> &'static str;

    fn provider(&self) -> Provider;

    /// Provider-side model id.
    fn model(&self) -> &str;

    /// URL and authentication headers.
    fn endpoint(&self) -> crate::Result<(String, HashMap<String, String>)>;

    /// Shape the conversation into the provider's request body.
    fn format_messages(&self, messages: &[Message], json_mode: bool, schema: Option<&Value>)
        -> Value;

    /// Text content of a successful response, if any.
    fn extract_content(&self, response: &Value) -> Option<String>;

    /// Token usage block of a response, for logging.
    fn usage<'a>(&self, response: &'a Value) -> Option<&'a Value>;

    fn build_request(
        &self,
        messages: &[Message],
        json_mode: bool,
        schema: Option<&Value>,
    ) -> crate::Result<DriverRequest> {
        let (url, headers) = self.endpoint()?;
        Ok(DriverRequest {
            url,
            headers,
            body: self.format_messages(messages, json_mode, schema),
        })
    }
}

/// Instruction appended to system prompts when a schema is requested and the
/// provider has no native schema mode.
pub(crate) fn schema_instruction(schema: &Value) -> String {
    let pretty = serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
    format!("\nRespond using this JSON schema:\n{}", pretty)
}

/// Collect the text of every system message, in order.
pub(crate) fn system_texts(messages: &[Message]) -> Vec<&str> {
    messages
        .iter()
        .filter(|m| m.role == crate::types::MessageRole::System)
        .filter_map(|m| m.text())
        .collect()
}

/// Factory function to create the driver for a provider.
///
/// `base_url` overrides the provider's public endpoint (mock servers, proxies).
pub fn create_driver(
    provider: Provider,
    model: &str,
    api_key: &str,
    base_url: Option<&str>,
) -> Box<dyn ProviderDriver> {
    match provider {
        Provider::OpenAi => Box::new(OpenAiDriver::new(model, api_key, base_url)),
        Provider::Anthropic => Box::new(AnthropicDriver::new(model, api_key, base_url)),
        Provider::Gemini => Box::new(GeminiDriver::new(model, api_key, base_url)),
    }
}

pub(crate) fn trim_base(base_url: Option<&str>, default: &str) -> String {
    base_url.unwrap_or(default).trim_end_matches('/').to_string()
}
