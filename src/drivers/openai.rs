//! OpenAI Chat Completions driver.
//!
//! - System messages stay in the `messages` array with role `system`.
//! - Images travel as `image_url` blocks holding a base64 `data:` URL.
//! - JSON mode uses the native `response_format: json_object`; a schema is
//!   described in the system prompt since `json_object` cannot carry one.

use serde_json::{json, Value};
use std::collections::HashMap;

use crate::models::Provider;
use crate::types::message::{Message, MessageRole};

use super::{schema_instruction, trim_base, ProviderDriver};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

#[derive(Debug)]
pub struct OpenAiDriver {
    model: String,
    api_key: String,
    base_url: String,
}

impl OpenAiDriver {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>, base_url: Option<&str>) -> Self {
        Self {
            model: model.into(),
            api_key: api_key.into(),
            base_url: trim_base(base_url, DEFAULT_BASE_URL),
        }
    }

    fn format_message(msg: &Message) -> Value {
        match msg.role {
            MessageRole::System => json!({ "role": "system", "content": msg.text }),
            MessageRole::User if msg.image.is_some() => {
                let mut content = Vec::new();
                if let Some(text) = msg.text() {
                    content.push(json!({ "type": "text", "text": text }));
                }
                if let Some(image) = &msg.image {
                    content.push(json!({
                        "type": "image_url",
                        "image_url": { "url": image.data_url() },
                    }));
                }
                json!({ "role": "user", "content": content })
            }
            MessageRole::User => json!({ "role": "user", "content": msg.text }),
            MessageRole::Assistant => json!({ "role": "assistant", "content": msg.text }),
        }
    }
}

impl ProviderDriver for OpenAiDriver {
    fn name(&self) -> &'static str {
        "OpenAiDriver"
    }

    fn provider(&self) -> Provider {
        Provider::OpenAi
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> crate::Result<(String, HashMap<String, String>)> {
        let mut headers = HashMap::new();
        headers.insert("Authorization".into(), format!("Bearer {}", self.api_key));
        Ok((format!("{}/v1/chat/completions", self.base_url), headers))
    }

    fn format_messages(&self, messages: &[Message], json_mode: bool, schema: Option<&Value>) -> Value {
        let mut formatted: Vec<Value> = messages.iter().map(Self::format_message).collect();

        if json_mode {
            if let Some(schema) = schema {
                let instruction = schema_instruction(schema);
                // Without a system message the schema is left to the response format.
                if let Some(idx) = messages.iter().position(|m| m.role == MessageRole::System) {
                    let current = messages[idx].text.clone().unwrap_or_default();
                    formatted[idx]["content"] = Value::String(format!("{}{}", current, instruction));
                }
            }
        }

        let mut body = json!({
            "model": self.model,
            "messages": formatted,
        });
        if json_mode {
            body["response_format"] = json!({ "type": "json_object" });
        }
        body
    }

    fn extract_content(&self, response: &Value) -> Option<String> {
        response
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .map(String::from)
    }

    fn usage<'a>(&self, response: &'a Value) -> Option<&'a Value> {
        response.get("usage")
    }
}
