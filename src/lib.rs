//! # worksheet-runtime
//!
//! 把课本页面（图片或文字提示）变成可交互练习题的运行时。
//!
//! Runtime that turns a textbook page (a photo or a text prompt) into an
//! interactive worksheet: an LLM writes a React/Mantine component, this crate
//! compiles it into an isolated QuickJS sandbox and hosts it.
//!
//! ## Overview
//!
//! - **Request protocol**: prompt templates, per-provider adapters, 503
//!   backoff retry, a content-addressed response cache and structured-output
//!   extraction ([`Query`], [`generate`]).
//! - **Ingestion pipeline**: fenced-code extraction, JSX lowering, import
//!   validation against a fixed capability registry and bounded evaluation
//!   ([`Compiler`]).
//! - **Rendering host**: renders the component to a serialisable tree, keeps
//!   hook state, dispatches events and contains failures behind an error
//!   boundary ([`RenderHost`]).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::rc::Rc;
//! use std::sync::Arc;
//! use worksheet_runtime::{
//!     answer_checker_value, generate_worksheet, ClientConfig, CompileRequest, Compiler,
//!     GenerateRequest, GenerationMode, ImageContent, LlmAnswerChecker, RenderHost,
//!     RuntimeContext, WorksheetSource,
//! };
//!
//! #[tokio::main(flavor = "multi_thread")]
//! async fn main() -> worksheet_runtime::Result<()> {
//!     let config = Arc::new(ClientConfig::from_env());
//!     let ctx = Arc::new(RuntimeContext::from_config(&config)?);
//!
//!     let generated = generate_worksheet(
//!         &ctx,
//!         GenerateRequest {
//!             source: WorksheetSource::Image(ImageContent::from_file("page.png")?),
//!             model_config: config.generation_model_config()?,
//!             mode: GenerationMode::Replicate,
//!         },
//!     )
//!     .await?;
//!
//!     let checker = answer_checker_value(Rc::new(LlmAnswerChecker::new(ctx.clone(), config)));
//!     let compiled = Compiler::new(ctx)
//!         .compile(CompileRequest::new(generated.app).with_context("checkUserAnswers", checker))?;
//!     let mut host = RenderHost::mount(compiled, serde_json::json!({}));
//!     println!("{}", serde_json::to_string_pretty(&host.render())?);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`types`] | Messages and inline images |
//! | [`models`] | Model catalog and [`ModelConfig`] |
//! | [`drivers`] | Provider request/response adapters |
//! | [`transport`] | HTTP transport and the single-attempt backend |
//! | [`cache`] | Content-addressed response cache |
//! | [`query`] | Retry/cache query builder |
//! | [`extract`] | Fenced code extraction |
//! | [`compiler`] | JSX compiler, capability registry and sandbox |
//! | [`host`] | Rendering host, error boundary, answer checking bridge |
//! | [`generate`] | Generation and validation workflows |
//! | [`context`] | Explicit runtime context |
//! | [`config`] | Client configuration |

pub mod cache;
pub mod compiler;
pub mod config;
pub mod context;
pub mod drivers;
pub mod extract;
pub mod generate;
pub mod host;
pub mod models;
pub mod query;
pub mod transport;
pub mod types;

pub use compiler::{
    CompileError, CompileRequest, CompiledComponent, Compiler, EvalError, EvalLimits, HostError, HostValue,
};
pub use config::ClientConfig;
pub use context::RuntimeContext;
pub use extract::{extract_guarded_code, ExtractedCode};
pub use generate::{
    generate_worksheet, validate_answers, CheckAnswerRequest, CheckAnswerResponse, GenerateRequest,
    GenerateResponse, GenerationMode, WorksheetSource,
};
pub use host::{answer_checker_value, AnswerChecker, LlmAnswerChecker, RenderHost, RenderOutcome, UiNode};
pub use models::{ModelConfig, Provider};
pub use query::{Query, RetryPolicy};
pub use types::message::{ImageContent, Message, MessageRole};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
