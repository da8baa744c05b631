//! `checkUserAnswers`: the validation callback handed to generated code.

use std::rc::Rc;
use std::sync::Arc;

use tokio::runtime::{Handle, Runtime, RuntimeFlavor};
use tokio::task::block_in_place;
use tracing::warn;

use crate::compiler::{HostError, HostValue};
use crate::config::ClientConfig;
use crate::context::RuntimeContext;
use crate::generate::{validate_answers, CheckAnswerRequest, CheckAnswerResponse};
use crate::{Error, Result};

/// Grades a batch of answers. Called synchronously from the sandbox.
pub trait AnswerChecker {
    fn check(&self, request: CheckAnswerRequest) -> Result<CheckAnswerResponse>;
}

impl<F> AnswerChecker for F
where
    F: Fn(CheckAnswerRequest) -> Result<CheckAnswerResponse>,
{
    fn check(&self, request: CheckAnswerRequest) -> Result<CheckAnswerResponse> {
        self(request)
    }
}

/// Grades answers with an LLM through [`validate_answers`].
///
/// Inside a multi-thread tokio runtime the call blocks the current worker
/// with `block_in_place`; outside any runtime a private one is started.
pub struct LlmAnswerChecker {
    ctx: Arc<RuntimeContext>,
    config: Arc<ClientConfig>,
}

impl LlmAnswerChecker {
    pub fn new(ctx: Arc<RuntimeContext>, config: Arc<ClientConfig>) -> Self {
        Self { ctx, config }
    }
}

impl AnswerChecker for LlmAnswerChecker {
    fn check(&self, request: CheckAnswerRequest) -> Result<CheckAnswerResponse> {
        let validation = validate_answers(&self.ctx, &self.config, request);
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::CurrentThread => Err(Error::configuration(
                "Answer checking needs a multi-thread tokio runtime",
            )),
            Ok(handle) => block_in_place(move || handle.block_on(validation)),
            Err(_) => Runtime::new()?.block_on(validation),
        }
    }
}

/// Wrap a checker as the host `checkUserAnswers(request)` function.
///
/// The returned promise is already settled: fulfilled with the response,
/// or rejected with an `Error` describing what went wrong.
pub fn answer_checker_value(checker: Rc<dyn AnswerChecker>) -> HostValue {
    HostValue::async_function(move |args| {
        let json = args.first().cloned().unwrap_or_default();
        let request = serde_json::from_value::<CheckAnswerRequest>(json)
            .map_err(|e| HostError::new("TypeError", format!("Invalid checkUserAnswers request: {}", e)))?;
        checker
            .check(request)
            .and_then(|response| Ok(serde_json::to_value(response)?))
            .map_err(|e| {
                warn!(error = %e, "Answer validation failed");
                HostError::new("Error", format!("Failed to validate answer: {}", e))
            })
    })
}
