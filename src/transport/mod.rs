//! HTTP transport and the single-attempt completion backend.

pub mod backend;
pub mod http;

pub use backend::{CompletionBackend, ProviderClient};
pub use http::{HttpReply, HttpTransport, TransportError};
