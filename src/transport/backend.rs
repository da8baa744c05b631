//! Single-attempt completion against a provider.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use crate::drivers::ProviderDriver;
use crate::error::{truncate_excerpt, Error, ERROR_EXCERPT_LIMIT};
use crate::types::message::Message;
use crate::Result;

use super::http::HttpTransport;

/// Anything that can turn a conversation into a completion.
///
/// Returns a JSON string for text mode, or the parsed document when
/// `json_mode` is set. The query builder depends on this seam, so tests can
/// substitute a scripted backend.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Model identifier used in logs.
    fn model(&self) -> &str;

    async fn complete(
        &self,
        messages: &[Message],
        json_mode: bool,
        schema: Option<&Value>,
    ) -> Result<Value>;
}

/// Driver + HTTP transport: one real provider round trip.
pub struct ProviderClient {
    driver: Box<dyn ProviderDriver>,
    transport: Arc<HttpTransport>,
}

impl ProviderClient {
    pub fn new(driver: Box<dyn ProviderDriver>, transport: Arc<HttpTransport>) -> Self {
        Self { driver, transport }
    }

    pub fn driver(&self) -> &dyn ProviderDriver {
        self.driver.as_ref()
    }
}

/// Interpret a successful provider body: extract text, log usage, parse JSON if requested.
pub(crate) fn interpret_response(
    driver: &dyn ProviderDriver,
    raw: &str,
    json_mode: bool,
) -> Result<Value> {
    let result: Value = serde_json::from_str(raw).map_err(|_| Error::EmptyResponse {
        provider: driver.name().to_string(),
        raw: truncate_excerpt(raw, ERROR_EXCERPT_LIMIT).to_string(),
    })?;

    let content = driver
        .extract_content(&result)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| Error::EmptyResponse {
            provider: driver.name().to_string(),
            raw: truncate_excerpt(&result.to_string(), ERROR_EXCERPT_LIMIT).to_string(),
        })?;

    if let Some(usage) = driver.usage(&result) {
        info!(model = driver.model(), usage = %usage, "API usage");
    }

    if json_mode {
        return serde_json::from_str(&content).map_err(|e| Error::MalformedStructuredOutput {
            raw: content.clone(),
            reason: e.to_string(),
        });
    }

    Ok(Value::String(content))
}

#[async_trait]
impl CompletionBackend for ProviderClient {
    fn model(&self) -> &str {
        self.driver.model()
    }

    async fn complete(
        &self,
        messages: &[Message],
        json_mode: bool,
        schema: Option<&Value>,
    ) -> Result<Value> {
        let request = self.driver.build_request(messages, json_mode, schema)?;
        let reply = self.transport.post_json(&request).await?;

        if !reply.is_success() {
            return Err(Error::provider(reply.status, self.driver.name(), &reply.body));
        }

        interpret_response(self.driver.as_ref(), &reply.body, json_mode)
    }
}
