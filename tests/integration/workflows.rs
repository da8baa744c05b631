//! Generation and validation workflows end to end over HTTP

use mockito::Matcher;
use serde_json::json;
use worksheet_runtime::config::ApiKeys;
use worksheet_runtime::generate::{AnswerInput, AnswerResult, GENERATION_SYSTEM_PROMPT};
use worksheet_runtime::{
    generate_worksheet, validate_answers, CheckAnswerRequest, ClientConfig, Error, GenerateRequest,
    GenerationMode, ImageContent, ModelConfig, WorksheetSource,
};

use crate::mock_server::{anthropic_reply, gemini_json_reply, MockServerFixture};

const REPLY: &str = "Here is your worksheet.\n```jsx\nexport default function App() {\n  return null;\n}\n```\nEnjoy!";

fn config_with_gemini_key() -> ClientConfig {
    ClientConfig {
        api_keys: ApiKeys {
            gemini: Some("g-config".into()),
            ..ApiKeys::default()
        },
        ..ClientConfig::default()
    }
}

#[tokio::test]
async fn test_generate_from_image_extracts_code() {
    let mut fixture = MockServerFixture::new().await;
    let mock = fixture
        .server
        .mock("POST", "/v1/messages")
        .match_body(Matcher::AllOf(vec![
            Matcher::PartialJson(json!({
                "model": "claude-3-5-sonnet-20241022",
                "system": GENERATION_SYSTEM_PROMPT,
            })),
            Matcher::Regex("Create a React app which mimics this textbook page".into()),
        ]))
        .with_status(200)
        .with_body(anthropic_reply(REPLY))
        .expect(1)
        .create_async()
        .await;

    let ctx = fixture.context();
    let request = GenerateRequest {
        source: WorksheetSource::Image(ImageContent::new("image/jpeg", "/9j/4AAQ")),
        model_config: ModelConfig::new("claude-3-5-sonnet-20241022", "ak"),
        mode: GenerationMode::Replicate,
    };

    let first = generate_worksheet(&ctx, request.clone()).await.unwrap();
    assert_eq!(first.app, "export default function App() {\n  return null;\n}");
    assert_eq!(first.context, "Here is your worksheet.\n\nEnjoy!");

    // Same request again is served from the cache.
    let second = generate_worksheet(&ctx, request).await.unwrap();
    assert_eq!(first, second);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_generate_from_prompt_uses_generate_prefix() {
    let mut fixture = MockServerFixture::new().await;
    let mock = fixture
        .server
        .mock("POST", "/v1/messages")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex("Create a new React app with exercises similar".into()),
            Matcher::Regex("Long division for year 5".into()),
        ]))
        .with_status(200)
        .with_body(anthropic_reply("export default () => null;"))
        .create_async()
        .await;

    let response = generate_worksheet(
        &fixture.context(),
        GenerateRequest {
            source: WorksheetSource::Prompt("Long division for year 5".into()),
            model_config: ModelConfig::new("claude-3-haiku-20240307", "ak"),
            mode: GenerationMode::Generate,
        },
    )
    .await
    .unwrap();

    assert_eq!(response.app, "export default () => null;");
    assert_eq!(response.context, "");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_validate_defaults_to_configured_validation_model() {
    let mut fixture = MockServerFixture::new().await;
    let mock = fixture
        .server
        .mock("POST", Matcher::Regex(r"^/v1beta/models/gemini-1\.5-flash-latest:generateContent".into()))
        .match_query(Matcher::UrlEncoded("key".into(), "g-config".into()))
        .match_body(Matcher::Regex("Answer 1: 12, Context: 3 x 4".into()))
        .with_status(200)
        .with_body(gemini_json_reply(&json!({
            "results": [{"isCorrect": true, "feedback": "Correct, 3 x 4 = 12."}]
        })))
        .create_async()
        .await;

    let request = CheckAnswerRequest {
        answers: vec![AnswerInput::new("12", "3 x 4")],
        global_context: "Times tables".into(),
        model_config: None,
    };
    let response = validate_answers(&fixture.context(), &config_with_gemini_key(), request)
        .await
        .unwrap();

    assert_eq!(
        response.results,
        vec![AnswerResult {
            is_correct: true,
            feedback: "Correct, 3 x 4 = 12.".into()
        }]
    );
    mock.assert_async().await;
}

#[tokio::test]
async fn test_validate_rejects_mismatched_result_count() {
    let mut fixture = MockServerFixture::new().await;
    fixture
        .server
        .mock("POST", Matcher::Regex(r"^/v1beta/models/".into()))
        .with_status(200)
        .with_body(gemini_json_reply(&json!({
            "results": [{"isCorrect": false, "feedback": "only one"}]
        })))
        .create_async()
        .await;

    let request = CheckAnswerRequest {
        answers: vec![AnswerInput::new("a", "first"), AnswerInput::new("b", "second")],
        global_context: String::new(),
        model_config: Some(ModelConfig::new("gemini-1.5-flash-002", "g")),
    };
    let err = validate_answers(&fixture.context(), &ClientConfig::default(), request)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::MalformedStructuredOutput { .. }));
}
