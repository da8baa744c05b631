//! Anthropic Messages API 驱动 — 实现 Anthropic 特有的请求/响应格式转换
//!
//! Anthropic Messages API driver. Handles the key differences from OpenAI:
//! - System messages are a single top-level `system` string, not part of `messages`.
//! - Content uses typed blocks: `[{"type": "text", "text": "..."}]`.
//! - Images are `{"type": "image", "source": {"type": "base64", ...}}` blocks.
//! - There is no JSON mode; structured output is requested in the system prompt.
//! - `max_tokens` is required, not optional.

use serde_json::{json, Value};
use std::collections::HashMap;

use crate::models::Provider;
use crate::types::message::{Message, MessageRole};

use super::{system_texts, trim_base, ProviderDriver};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API driver.
#[derive(Debug)]
pub struct AnthropicDriver {
    model: String,
    api_key: String,
    base_url: String,
}

impl AnthropicDriver {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>, base_url: Option<&str>) -> Self {
        Self {
            model: model.into(),
            api_key: api_key.into(),
            base_url: trim_base(base_url, DEFAULT_BASE_URL),
        }
    }

    /// Conversation turns without system messages.
    fn turns(messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .filter(|m| m.role != MessageRole::System)
            .map(|m| {
                let role = match m.role {
                    MessageRole::Assistant => "assistant",
                    _ => "user",
                };
                let mut content = Vec::new();
                if let Some(text) = m.text() {
                    content.push(json!({ "type": "text", "text": text }));
                }
                if let Some(image) = &m.image {
                    content.push(json!({
                        "type": "image",
                        "source": {
                            "type": "base64",
                            "media_type": image.mime_type,
                            "data": image.base64,
                        },
                    }));
                }
                json!({ "role": role, "content": content })
            })
            .collect()
    }
}

impl ProviderDriver for AnthropicDriver {
    fn name(&self) -> &'static str {
        "AnthropicDriver"
    }

    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> crate::Result<(String, HashMap<String, String>)> {
        let mut headers = HashMap::new();
        headers.insert("anthropic-version".into(), ANTHROPIC_VERSION.into());
        headers.insert("x-api-key".into(), self.api_key.clone());
        Ok((format!("{}/v1/messages", self.base_url), headers))
    }

    fn format_messages(&self, messages: &[Message], json_mode: bool, _schema: Option<&Value>) -> Value {
        let mut system_prompt = system_texts(messages).join("\n");
        if json_mode {
            system_prompt.push_str("\nRespond using ONLY JSON.");
        }

        let mut body = json!({
            "model": self.model,
            "messages": Self::turns(messages),
            "max_tokens": DEFAULT_MAX_TOKENS,
        });
        if !system_prompt.is_empty() {
            body["system"] = Value::String(system_prompt);
        }
        body
    }

    fn extract_content(&self, response: &Value) -> Option<String> {
        // Anthropic response: { content: [{type: "text", text: "..."}], stop_reason, usage }
        response
            .pointer("/content/0/text")
            .and_then(|v| v.as_str())
            .map(String::from)
    }

    fn usage<'a>(&self, response: &'a Value) -> Option<&'a Value> {
        response.get("usage")
    }
}
