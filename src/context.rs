//! Explicit runtime context handed to every query and compiler.
//!
//! Holds what used to be process-wide singletons (response cache, HTTP
//! client, retry policy, evaluation limits) so tests and concurrent
//! configurations can each use their own.

use std::sync::Arc;

use crate::cache::{FileCache, MemoryCache, NullCache, ResponseCache};
use crate::compiler::EvalLimits;
use crate::config::ClientConfig;
use crate::query::RetryPolicy;
use crate::transport::HttpTransport;
use crate::Result;

pub struct RuntimeContext {
    pub cache: Arc<ResponseCache>,
    pub transport: Arc<HttpTransport>,
    pub retry: RetryPolicy,
    pub limits: EvalLimits,
    pub base_url_override: Option<String>,
}

impl RuntimeContext {
    /// Context backed by the on-disk cache under `config.data_dir`.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let cache = ResponseCache::new(Box::new(FileCache::new(config.cache_dir())?));
        Ok(Self {
            cache: Arc::new(cache),
            transport: Arc::new(HttpTransport::new()?),
            retry: config.retry.clone(),
            limits: config.limits,
            base_url_override: config.base_url_override.clone(),
        })
    }

    /// In-memory cache, default policies. Nothing touches the disk.
    pub fn ephemeral() -> Result<Self> {
        Ok(Self {
            cache: Arc::new(ResponseCache::new(Box::new(MemoryCache::new()))),
            transport: Arc::new(HttpTransport::new()?),
            retry: RetryPolicy::default(),
            limits: EvalLimits::default(),
            base_url_override: None,
        })
    }

    /// Disable response caching.
    pub fn without_cache(mut self) -> Self {
        self.cache = Arc::new(ResponseCache::new(Box::new(NullCache::new())));
        self
    }

    pub fn with_cache(mut self, cache: ResponseCache) -> Self {
        self.cache = Arc::new(cache);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_limits(mut self, limits: EvalLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_base_url_override(mut self, base_url: impl Into<String>) -> Self {
        self.base_url_override = Some(base_url.into());
        self
    }
}
