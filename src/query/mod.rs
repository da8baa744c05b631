//! Retry/cache query builder.
//!
//! A [`Query`] accumulates a multi-turn prompt, dispatches it through the
//! provider's [`crate::transport::CompletionBackend`], retries provider
//! overload (HTTP 503) with exponential backoff and memoizes successful
//! responses in the context's content-addressed cache.

mod builder;
mod retry;

pub use builder::Query;
pub use retry::RetryPolicy;
