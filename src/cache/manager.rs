//! Cache manager.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::backend::CacheBackend;
use super::key::{CacheKey, CacheRequest};
use crate::Result;

/// Durable record of one provider call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub timestamp: DateTime<Utc>,
    pub request: CacheRequest,
    pub response: Value,
}

#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub errors: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    errors: AtomicU64,
}

impl AtomicStats {
    fn to_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Content-addressed response cache.
///
/// LLM outputs are treated as pure functions of the request tuple: there is
/// no TTL and no invalidation.
pub struct ResponseCache {
    backend: Box<dyn CacheBackend>,
    stats: Arc<AtomicStats>,
}

impl ResponseCache {
    pub fn new(backend: Box<dyn CacheBackend>) -> Self {
        Self {
            backend,
            stats: Arc::new(AtomicStats::default()),
        }
    }

    /// Stored response for the key. Unreadable entries count as misses.
    pub async fn get(&self, key: &CacheKey) -> Result<Option<Value>> {
        match self.backend.get(key).await {
            Ok(Some(data)) => match serde_json::from_slice::<CacheEntry>(&data) {
                Ok(entry) => {
                    self.stats.hits.fetch_add(1, Ordering::Relaxed);
                    Ok(Some(entry.response))
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Ignoring unreadable cache entry");
                    self.stats.errors.fetch_add(1, Ordering::Relaxed);
                    Ok(None)
                }
            },
            Ok(None) => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    pub async fn set(&self, key: &CacheKey, request: &CacheRequest, response: &Value) -> Result<()> {
        let entry = CacheEntry {
            timestamp: Utc::now(),
            request: request.clone(),
            response: response.clone(),
        };
        let data = serde_json::to_vec_pretty(&entry)?;
        match self.backend.set(key, &data).await {
            Ok(()) => {
                self.stats.sets.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    pub async fn len(&self) -> Result<usize> {
        self.backend.len().await
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.to_stats()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }
}
