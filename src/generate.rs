//! Worksheet generation and answer validation workflows.
//!
//! Both run through [`Query`], so they share its response cache and 503
//! retry. Generation extracts the component source from the reply;
//! validation asks for JSON and checks the reply against the schema of
//! [`CheckAnswerResponse`].

use std::fmt;
use std::sync::Arc;

use jsonschema::{Draft, JSONSchema};
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::context::RuntimeContext;
use crate::extract::{extract_guarded_code, ExtractedCode};
use crate::models::ModelConfig;
use crate::query::Query;
use crate::types::message::ImageContent;
use crate::{Error, Result};

pub const GENERATION_SYSTEM_PROMPT: &str = "You are an expert frontend developer and write amazing interactive React applications.
You follow user instructions exactly.
You output _only_ JS. Your JS output must be parseable directly!";

pub const REPLICATE_PREFIX: &str = "Create a React app which mimics this textbook page.

It should exactly imitate the design and layout of the page. It should have all
of the same content as the page. The only changes you should make is to replace
places where the reader is expected to write answers with appropriate
text/select/textarea inputs.";

pub const GENERATE_PREFIX: &str = "Create a new React app with exercises similar in style and theme to this textbook page.

Generate new exercises that test similar concepts but with different content.
The exercises should maintain the same difficulty level and teaching approach.";

pub const BASE_PROMPT: &str = "You are allowed to use the following libraries:

* mantine v7
* react
* react-dom

You should export a single component with your app. You can use as many child
components as needed to complete the task. You should try to do a good job and
write clean code.

You have access to the following function which will validate the user's answers
by sending them off to an expert. The expert does not have any information about
the user's answers other than what you provide in the context.

interface CheckAnswerRequest = {
  globalContext: string,
  answers: [{
    answer: string;
    context: string;
  }],
}

interface CheckAnswerResponse = {
  results: [{
    isCorrect: boolean;
    feedback: string;
  }],
}

checkUserAnswers(request: CheckAnswerRequest): Promise<CheckAnswerResponse>

You must:

* Provide a \"submit\" button or similar to validate the user's answers.
* Provide a loading spinner while the validation is in progress.
* Include the entire page (or similar level of detail) in the \"globalContext\" field with appropriate information about the type of content.
* Include enough local context for each answer to allow the checkUserAnswers to correctly understand the question and the users answer.
* Show feedback after validation is complete.
* Show positive feedback for correct answers, e.g. a green checkmark.
* Show each feedback next to the corresponding input.
* Write good code: don't duplicate content and factor logic appropriately.";

pub const CHECK_ANSWER_SYSTEM_PROMPT: &str = "You are an expert teacher. You understand all world languages, programming
languages etc and are generally recognized for your ability to provide
excellent corrective feedback when students make mistakes.

You have been given a set of answers and contexts. You should examine each
answer and determine if it is correct. You should provide detailed feedback
explaining why or why not for each answer.";

pub const CHECK_ANSWER_USER_PROMPT: &str = "Please examine the inputs provided and determine if they are correct.
Provide detailed feedback explaining why or why not for each input.

Return a JSON object with the following structure:

interface CheckAnswerResponse = {
  results: [{
    isCorrect: boolean;
    feedback: string;
  }],
}";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    /// Mimic the page, turning blanks into inputs.
    #[default]
    Replicate,
    /// New exercises in the style of the page.
    Generate,
}

impl GenerationMode {
    pub fn prefix(&self) -> &'static str {
        match self {
            GenerationMode::Replicate => REPLICATE_PREFIX,
            GenerationMode::Generate => GENERATE_PREFIX,
        }
    }

    /// Mode prefix followed by the shared base prompt.
    pub fn instructions(&self) -> String {
        format!("{}\n\n{}", self.prefix(), BASE_PROMPT)
    }
}

impl fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GenerationMode::Replicate => "replicate",
            GenerationMode::Generate => "generate",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorksheetSource {
    Image(ImageContent),
    Prompt(String),
}

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub source: WorksheetSource,
    pub model_config: ModelConfig,
    pub mode: GenerationMode,
}

/// Component source (`app`) plus the prose around it (`context`).
pub type GenerateResponse = ExtractedCode;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerInput {
    #[serde(deserialize_with = "answer_text")]
    pub answer: String,
    #[serde(default)]
    pub context: String,
}

impl AnswerInput {
    pub fn new(answer: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            context: context.into(),
        }
    }
}

/// Generated code passes numbers and booleans as answers too.
fn answer_text<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckAnswerRequest {
    pub answers: Vec<AnswerInput>,
    #[serde(default)]
    pub global_context: String,
    /// Falls back to the configured validation model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_config: Option<ModelConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResult {
    pub is_correct: bool,
    pub feedback: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CheckAnswerResponse {
    pub results: Vec<AnswerResult>,
}

/// Ask the model for a worksheet component and pull its source out of the reply.
pub async fn generate_worksheet(ctx: &Arc<RuntimeContext>, request: GenerateRequest) -> Result<GenerateResponse> {
    let query = Query::new(ctx.clone(), &request.model_config)?
        .system(GENERATION_SYSTEM_PROMPT)
        .user(request.mode.instructions());
    let query = match request.source {
        WorksheetSource::Image(image) => query.image(image),
        WorksheetSource::Prompt(prompt) => query.user(prompt),
    };

    let response = query.execute().await?;
    let text = match response {
        Value::String(text) => text,
        other => other.to_string(),
    };
    let extracted = extract_guarded_code(&text);
    info!(
        model = %request.model_config.model,
        mode = %request.mode,
        app_chars = extracted.app.len(),
        "Generated worksheet"
    );
    Ok(extracted)
}

/// The per-answer section of the validation prompt.
pub fn answers_prompt(request: &CheckAnswerRequest) -> String {
    let answers = request
        .answers
        .iter()
        .enumerate()
        .map(|(index, a)| format!("Answer {}: {}, Context: {}", index + 1, a.answer, a.context))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "\nGlobal context is {}\nUser answers and their contexts are:\n{}\n",
        request.global_context, answers
    )
}

/// Grade answers with the request's model, or the configured validation model.
pub async fn validate_answers(
    ctx: &Arc<RuntimeContext>,
    config: &ClientConfig,
    request: CheckAnswerRequest,
) -> Result<CheckAnswerResponse> {
    let model = match &request.model_config {
        Some(model) => model.clone(),
        None => config.validation_model_config()?,
    };

    let response = Query::new(ctx.clone(), &model)?
        .system(CHECK_ANSWER_SYSTEM_PROMPT)
        .user(CHECK_ANSWER_USER_PROMPT)
        .user(answers_prompt(&request))
        .output_json(None)
        .execute()
        .await?;
    debug!(model = %model.model, response = %response, "Validation response");

    let checked = parse_check_response(response, request.answers.len())?;
    info!(
        model = %model.model,
        answers = checked.results.len(),
        correct = checked.results.iter().filter(|r| r.is_correct).count(),
        "Validated answers"
    );
    Ok(checked)
}

fn response_schema() -> Result<JSONSchema> {
    let schema = serde_json::to_value(schemars::schema_for!(CheckAnswerResponse))?;
    JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(&schema)
        .map_err(|e| Error::configuration(format!("Failed to compile response schema: {}", e)))
}

/// Schema-check a validation reply and require one result per answer.
pub fn parse_check_response(response: Value, expected: usize) -> Result<CheckAnswerResponse> {
    let schema = response_schema()?;
    if let Err(errors) = schema.validate(&response) {
        let reason = errors.map(|e| e.to_string()).collect::<Vec<_>>().join("; ");
        return Err(Error::MalformedStructuredOutput {
            raw: response.to_string(),
            reason,
        });
    }

    let raw = response.to_string();
    let parsed: CheckAnswerResponse = serde_json::from_value(response).map_err(|e| Error::MalformedStructuredOutput {
        raw: raw.clone(),
        reason: e.to_string(),
    })?;
    if parsed.results.len() != expected {
        return Err(Error::MalformedStructuredOutput {
            raw,
            reason: format!("expected {} results, got {}", expected, parsed.results.len()),
        });
    }
    Ok(parsed)
}
