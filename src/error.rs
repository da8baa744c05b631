use crate::compiler::CompileError;
use thiserror::Error;

/// Maximum number of characters of a provider body or request context kept in an error.
pub const ERROR_EXCERPT_LIMIT: usize = 1000;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "models.validation", "api_keys.gemini")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected type, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "config_loader", "model_catalog")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Unified error type for the worksheet runtime.
///
/// Provider failures, cache I/O, compilation of generated code and render
/// failures all funnel into this enum so the caller can pick a single
/// fallback per category.
#[derive(Debug, Error)]
pub enum Error {
    /// Non-2xx HTTP answer from a provider. A 503 is the transient overload
    /// signal and is retried by the query builder.
    #[error("{message}")]
    Provider { status: u16, message: String },

    #[error("Maximum retry attempts ({attempts}) exceeded: {source}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    #[error("No content in {provider} response: {raw}")]
    EmptyResponse { provider: String, raw: String },

    #[error("Failed to parse JSON response ({reason}): {raw}")]
    MalformedStructuredOutput { raw: String, reason: String },

    #[error("Failed to compile component: {0}")]
    Compilation(#[from] CompileError),

    #[error("User component error: {message}")]
    Render { message: String },

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Network transport error: {0}")]
    Transport(#[from] crate::transport::TransportError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

/// Keep at most `limit` characters of `text`, respecting char boundaries.
pub fn truncate_excerpt(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

impl Error {
    /// Build a provider error from an HTTP status, the caller context and the response body.
    ///
    /// Both the context and the body are truncated to [`ERROR_EXCERPT_LIMIT`] characters.
    pub fn provider(status: u16, context: &str, body: &str) -> Self {
        let context_str = if context.is_empty() {
            String::new()
        } else {
            format!(" for {}", context)
        };
        Error::Provider {
            status,
            message: format!(
                "API error{} ({}): {}",
                truncate_excerpt(&context_str, ERROR_EXCERPT_LIMIT),
                status,
                truncate_excerpt(body, ERROR_EXCERPT_LIMIT)
            ),
        }
    }

    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::configuration_with_context(msg, ErrorContext::new())
    }

    /// HTTP status carried by the error, if it came from a provider.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Provider { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the provider signalled a transient overload (HTTP 503).
    pub fn is_transient(&self) -> bool {
        self.status() == Some(503)
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. } => Some(context),
            _ => None,
        }
    }
}
