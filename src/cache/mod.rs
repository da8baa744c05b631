//! 响应缓存模块：按请求内容寻址的持久化缓存，避免重复计费的 API 调用。
//!
//! # Response Caching Module
//!
//! Provider calls are metered, so identical requests are answered from a
//! content-addressed cache instead of the network.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`ResponseCache`] | Serializes [`CacheEntry`] records and tracks statistics |
//! | [`CacheBackend`] | Trait for byte-level storage |
//! | [`FileCache`] | Flat directory, one `<sha256>.json` file per request |
//! | [`MemoryCache`] | In-process map, for tests and ephemeral runs |
//! | [`NullCache`] | No-op cache for disabling caching |
//! | [`CacheKey`] | SHA-256 of `{model, messages, jsonMode, jsonSchema}` |
//!
//! Entries never expire: a model's answer is assumed to be a pure function of
//! the request. Concurrent writers of one key race harmlessly since they
//! write identical requests.

mod backend;
mod key;
mod manager;

pub use backend::{CacheBackend, FileCache, MemoryCache, NullCache};
pub use key::{CacheKey, CacheRequest};
pub use manager::{CacheEntry, CacheStats, ResponseCache};
