use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::{CacheKey, CacheRequest};
use crate::context::RuntimeContext;
use crate::drivers::create_driver;
use crate::models::{resolve_model, ModelConfig};
use crate::transport::{CompletionBackend, ProviderClient};
use crate::types::message::{ImageContent, Message};
use crate::{Error, Result};

/// Fluent multi-turn request with retry and response caching.
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use worksheet_runtime::{ModelConfig, Query, RuntimeContext};
/// # async fn run() -> worksheet_runtime::Result<()> {
/// let ctx = Arc::new(RuntimeContext::ephemeral()?);
/// let answer = Query::new(ctx, &ModelConfig::new("gpt-4o-mini", "sk-..."))?
///     .system("You are a terse assistant.")
///     .user("What is 2 + 2?")
///     .execute()
///     .await?;
/// # Ok(()) }
/// ```
pub struct Query {
    ctx: Arc<RuntimeContext>,
    model: String,
    messages: Vec<Message>,
    json_mode: bool,
    json_schema: Option<Value>,
    backend: Box<dyn CompletionBackend>,
}

impl Query {
    /// Bind a query to the driver matching the model's provider.
    pub fn new(ctx: Arc<RuntimeContext>, config: &ModelConfig) -> Result<Self> {
        let (provider, model_id) = resolve_model(&config.model)?;
        let driver = create_driver(
            provider,
            &model_id,
            &config.api_key,
            ctx.base_url_override.as_deref(),
        );
        let backend = ProviderClient::new(driver, ctx.transport.clone());
        Ok(Self::with_backend(ctx, config.model.clone(), Box::new(backend)))
    }

    /// Bind a query to an arbitrary backend.
    pub fn with_backend(
        ctx: Arc<RuntimeContext>,
        model: impl Into<String>,
        backend: Box<dyn CompletionBackend>,
    ) -> Self {
        Self {
            ctx,
            model: model.into(),
            messages: Vec::new(),
            json_mode: false,
            json_schema: None,
            backend,
        }
    }

    pub fn system(mut self, prompt: impl Into<String>) -> Self {
        self.messages.push(Message::system(prompt));
        self
    }

    pub fn user(mut self, prompt: impl Into<String>) -> Self {
        self.messages.push(Message::user(prompt));
        self
    }

    pub fn image(mut self, image: ImageContent) -> Self {
        self.messages.push(Message::image(image));
        self
    }

    /// Request structured output, optionally constrained by a JSON schema.
    ///
    /// Calling it again without a schema clears a previously set one.
    pub fn output_json(mut self, schema: Option<Value>) -> Self {
        self.json_mode = true;
        self.json_schema = schema;
        self
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_json_mode(&self) -> bool {
        self.json_mode
    }

    fn cache_request(&self) -> CacheRequest {
        CacheRequest {
            model: self.model.clone(),
            messages: self.messages.clone(),
            json_mode: self.json_mode,
            json_schema: self.json_schema.clone(),
        }
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey::for_request(&self.cache_request())
    }

    /// Execute with the context's attempt budget (5 by default).
    pub async fn execute(&self) -> Result<Value> {
        self.execute_with_attempts(self.ctx.retry.max_attempts).await
    }

    /// Execute with an explicit attempt budget.
    ///
    /// Cached responses are returned without a network call. HTTP 503 is
    /// retried with exponential backoff; every other failure propagates
    /// immediately. Successful responses are cached before returning.
    pub async fn execute_with_attempts(&self, max_attempts: u32) -> Result<Value> {
        let request = self.cache_request();
        let key = CacheKey::for_request(&request);

        if let Some(cached) = self.ctx.cache.get(&key).await? {
            info!(model = %self.model, key = %key, "Using cached response");
            return Ok(cached);
        }

        let policy = self.ctx.retry.clone().with_max_attempts(max_attempts);
        let mut failures = 0u32;

        loop {
            debug!(model = %self.model, attempt = failures + 1, "Dispatching completion");
            let result = self
                .backend
                .complete(&self.messages, self.json_mode, self.json_schema.as_ref())
                .await;

            match result {
                Ok(response) => {
                    self.ctx.cache.set(&key, &request, &response).await?;
                    return Ok(response);
                }
                Err(error) if error.is_transient() => {
                    failures += 1;
                    warn!(
                        model = %self.model,
                        "Received 503 error, attempt {} of {}",
                        failures,
                        max_attempts
                    );
                    match policy.should_retry(failures, &error) {
                        Some(delay) => tokio::time::sleep(delay).await,
                        None => {
                            return Err(Error::RetryExhausted {
                                attempts: max_attempts,
                                source: Box::new(error),
                            })
                        }
                    }
                }
                Err(error) => return Err(error),
            }
        }
    }
}
