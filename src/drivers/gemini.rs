//! Gemini Generate API 驱动 — 实现 Google Gemini 特有的请求/响应格式转换
//!
//! Google Gemini generateContent API driver. Key differences:
//! - Uses `contents` instead of `messages`, with `parts` instead of `content`.
//! - Roles: `user` and `model` (not `assistant`). System uses `system_instruction`.
//! - Images are `inline_data` parts.
//! - JSON mode is `generationConfig.response_mime_type`; schemas go into the
//!   system instruction.
//! - API key is passed as `?key=` query parameter, not in headers.

use serde_json::{json, Value};
use std::collections::HashMap;

use crate::error::{Error, ErrorContext};
use crate::models::Provider;
use crate::types::message::{Message, MessageRole};

use super::{schema_instruction, system_texts, trim_base, ProviderDriver};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Google Gemini generateContent API driver.
#[derive(Debug)]
pub struct GeminiDriver {
    model: String,
    api_key: String,
    base_url: String,
}

impl GeminiDriver {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>, base_url: Option<&str>) -> Self {
        Self {
            model: model.into(),
            api_key: api_key.into(),
            base_url: trim_base(base_url, DEFAULT_BASE_URL),
        }
    }

    fn parts(msg: &Message) -> Vec<Value> {
        let mut parts = Vec::new();
        if let Some(image) = &msg.image {
            parts.push(json!({
                "inline_data": { "mime_type": image.mime_type, "data": image.base64 },
            }));
        }
        if let Some(text) = msg.text() {
            parts.push(json!({ "text": text }));
        }
        parts
    }
}

impl ProviderDriver for GeminiDriver {
    fn name(&self) -> &'static str {
        "GeminiDriver"
    }

    fn provider(&self) -> Provider {
        Provider::Gemini
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> crate::Result<(String, HashMap<String, String>)> {
        let raw = format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model);
        let mut url = url::Url::parse(&raw).map_err(|e| {
            Error::configuration_with_context(
                format!("Invalid Gemini endpoint: {}", e),
                ErrorContext::new().with_details(raw.clone()).with_source("gemini_driver"),
            )
        })?;
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok((url.to_string(), HashMap::new()))
    }

    fn format_messages(&self, messages: &[Message], json_mode: bool, schema: Option<&Value>) -> Value {
        let mut system_instruction = system_texts(messages).join("\n");
        if json_mode {
            if let Some(schema) = schema {
                system_instruction.push_str(&schema_instruction(schema));
            }
        }

        let contents: Vec<Value> = messages
            .iter()
            .filter(|m| m.role != MessageRole::System)
            .map(|m| {
                let role = match m.role {
                    MessageRole::Assistant => "model",
                    _ => "user",
                };
                json!({ "role": role, "parts": Self::parts(m) })
            })
            .collect();

        // A lone turn is sent as an object; the API accepts both forms.
        let contents = if contents.len() == 1 {
            contents.into_iter().next().unwrap_or(Value::Null)
        } else {
            Value::Array(contents)
        };

        let mut body = json!({
            "system_instruction": { "parts": [{ "text": system_instruction }] },
            "contents": contents,
        });
        if json_mode {
            body["generationConfig"] = json!({ "response_mime_type": "application/json" });
        }
        body
    }

    fn extract_content(&self, response: &Value) -> Option<String> {
        response
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(|v| v.as_str())
            .map(String::from)
    }

    fn usage<'a>(&self, response: &'a Value) -> Option<&'a Value> {
        response.get("usageMetadata")
    }
}
