//! Mock HTTP server setup for integration tests

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use mockito::{Server, ServerGuard};
use serde_json::{json, Value};
use worksheet_runtime::cache::{FileCache, ResponseCache};
use worksheet_runtime::{RetryPolicy, RuntimeContext};

/// Test fixture that owns a mock server and points every provider at it
pub struct MockServerFixture {
    pub server: ServerGuard,
    pub base_url: String,
}

impl MockServerFixture {
    pub async fn new() -> Self {
        let server = Server::new_async().await;
        let base_url = server.url();
        Self { server, base_url }
    }

    /// Millisecond backoff so retry tests stay fast.
    pub fn fast_retry() -> RetryPolicy {
        RetryPolicy::default().with_delays(Duration::from_millis(1), Duration::from_millis(4))
    }

    /// In-memory cache, mock base URL.
    pub fn context(&self) -> Arc<RuntimeContext> {
        Arc::new(
            RuntimeContext::ephemeral()
                .expect("context")
                .with_base_url_override(&self.base_url)
                .with_retry(Self::fast_retry()),
        )
    }

    /// On-disk cache under `dir`, mock base URL.
    pub fn file_context(&self, dir: &Path) -> Arc<RuntimeContext> {
        let cache = ResponseCache::new(Box::new(FileCache::new(dir).expect("cache dir")));
        Arc::new(
            RuntimeContext::ephemeral()
                .expect("context")
                .with_cache(cache)
                .with_base_url_override(&self.base_url)
                .with_retry(Self::fast_retry()),
        )
    }
}

pub fn openai_reply(content: &str) -> String {
    json!({
        "choices": [{"message": {"role": "assistant", "content": content}}],
        "usage": {"prompt_tokens": 12, "completion_tokens": 3}
    })
    .to_string()
}

pub fn anthropic_reply(content: &str) -> String {
    json!({
        "content": [{"type": "text", "text": content}],
        "stop_reason": "end_turn",
        "usage": {"input_tokens": 20, "output_tokens": 8}
    })
    .to_string()
}

pub fn gemini_reply(content: &str) -> String {
    json!({
        "candidates": [{"content": {"role": "model", "parts": [{"text": content}]}}],
        "usageMetadata": {"promptTokenCount": 5}
    })
    .to_string()
}

pub fn gemini_json_reply(document: &Value) -> String {
    gemini_reply(&document.to_string())
}
