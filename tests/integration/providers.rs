//! Provider adapters and the query builder against a mock HTTP server

use mockito::Matcher;
use serde_json::{json, Value};
use worksheet_runtime::cache::CacheKey;
use worksheet_runtime::{Error, ImageContent, ModelConfig, Query};

use crate::mock_server::{anthropic_reply, gemini_reply, openai_reply, MockServerFixture};

#[tokio::test]
async fn test_openai_text_completion() {
    let mut fixture = MockServerFixture::new().await;
    let mock = fixture
        .server
        .mock("POST", "/v1/chat/completions")
        .match_header("authorization", "Bearer sk-test")
        .match_body(Matcher::PartialJson(json!({
            "model": "gpt-4o-mini",
            "messages": [
                {"role": "system", "content": "Be terse."},
                {"role": "user", "content": "2 + 2?"}
            ]
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(openai_reply("4"))
        .create_async()
        .await;

    let answer = Query::new(fixture.context(), &ModelConfig::new("gpt-4o-mini", "sk-test"))
        .unwrap()
        .system("Be terse.")
        .user("2 + 2?")
        .execute()
        .await
        .unwrap();

    assert_eq!(answer, Value::String("4".into()));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_anthropic_request_shape() {
    let mut fixture = MockServerFixture::new().await;
    let mock = fixture
        .server
        .mock("POST", "/v1/messages")
        .match_header("x-api-key", "ak-test")
        .match_header("anthropic-version", "2023-06-01")
        .match_body(Matcher::PartialJson(json!({
            "model": "claude-3-haiku-20240307",
            "system": "First.\nSecond.",
            "max_tokens": 4096,
            "messages": [
                {"role": "user", "content": [{"type": "text", "text": "Describe"}]},
                {"role": "user", "content": [{
                    "type": "image",
                    "source": {"type": "base64", "media_type": "image/png", "data": "aGk="}
                }]}
            ]
        })))
        .with_status(200)
        .with_body(anthropic_reply("A page of fractions."))
        .create_async()
        .await;

    let answer = Query::new(fixture.context(), &ModelConfig::new("claude-3-haiku-20240307", "ak-test"))
        .unwrap()
        .system("First.")
        .system("Second.")
        .user("Describe")
        .image(ImageContent::new("image/png", "aGk="))
        .execute()
        .await
        .unwrap();

    assert_eq!(answer, Value::String("A page of fractions.".into()));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_gemini_json_mode() {
    let mut fixture = MockServerFixture::new().await;
    let mock = fixture
        .server
        .mock("POST", Matcher::Regex(r"^/v1beta/models/gemini-1\.5-flash-latest:generateContent".into()))
        .match_query(Matcher::UrlEncoded("key".into(), "g-test".into()))
        .match_body(Matcher::PartialJson(json!({
            "contents": {"role": "user", "parts": [{"text": "List two primes"}]},
            "generationConfig": {"response_mime_type": "application/json"}
        })))
        .with_status(200)
        .with_body(gemini_reply(r#"{"primes": [2, 3]}"#))
        .create_async()
        .await;

    let answer = Query::new(fixture.context(), &ModelConfig::new("gemini-1.5-flash-latest", "g-test"))
        .unwrap()
        .user("List two primes")
        .output_json(None)
        .execute()
        .await
        .unwrap();

    assert_eq!(answer, json!({"primes": [2, 3]}));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_client_error_carries_status_and_truncated_body() {
    let mut fixture = MockServerFixture::new().await;
    let mock = fixture
        .server
        .mock("POST", "/v1/chat/completions")
        .with_status(401)
        .with_body("x".repeat(4000))
        .expect(1)
        .create_async()
        .await;

    let err = Query::new(fixture.context(), &ModelConfig::new("gpt-4o", "bad"))
        .unwrap()
        .user("hi")
        .execute()
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(401));
    let message = err.to_string();
    assert!(message.starts_with("API error for OpenAiDriver (401): "));
    assert!(message.len() < 1100);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_503_is_retried_until_exhausted() {
    let mut fixture = MockServerFixture::new().await;
    let mock = fixture
        .server
        .mock("POST", "/v1/messages")
        .with_status(503)
        .with_body("overloaded")
        .expect(3)
        .create_async()
        .await;

    let err = Query::new(fixture.context(), &ModelConfig::new("claude-3-haiku-20240307", "k"))
        .unwrap()
        .user("hi")
        .execute_with_attempts(3)
        .await
        .unwrap_err();

    match err {
        Error::RetryExhausted { attempts, source } => {
            assert_eq!(attempts, 3);
            assert!(source.is_transient());
        }
        other => panic!("unexpected error: {}", other),
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn test_503_then_success() {
    let mut fixture = MockServerFixture::new().await;
    let overloaded = fixture
        .server
        .mock("POST", "/v1/chat/completions")
        .with_status(503)
        .expect(1)
        .create_async()
        .await;
    let ok = fixture
        .server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_body(openai_reply("recovered"))
        .expect(1)
        .create_async()
        .await;

    let answer = Query::new(fixture.context(), &ModelConfig::new("gpt-4o", "k"))
        .unwrap()
        .user("hi")
        .execute()
        .await
        .unwrap();

    assert_eq!(answer, Value::String("recovered".into()));
    overloaded.assert_async().await;
    ok.assert_async().await;
}

#[tokio::test]
async fn test_empty_content_is_an_error() {
    let mut fixture = MockServerFixture::new().await;
    fixture
        .server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_body(json!({"choices": []}).to_string())
        .create_async()
        .await;

    let err = Query::new(fixture.context(), &ModelConfig::new("gpt-4o", "k"))
        .unwrap()
        .user("hi")
        .execute()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::EmptyResponse { ref provider, .. } if provider == "OpenAiDriver"));
}

#[tokio::test]
async fn test_invalid_json_in_json_mode() {
    let mut fixture = MockServerFixture::new().await;
    fixture
        .server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_body(openai_reply("not json at all"))
        .create_async()
        .await;

    let err = Query::new(fixture.context(), &ModelConfig::new("gpt-4o", "k"))
        .unwrap()
        .user("hi")
        .output_json(None)
        .execute()
        .await
        .unwrap_err();

    match err {
        Error::MalformedStructuredOutput { raw, .. } => assert_eq!(raw, "not json at all"),
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_file_cache_layout_and_hit() {
    let dir = tempfile::tempdir().unwrap();
    let mut fixture = MockServerFixture::new().await;
    let mock = fixture
        .server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_body(openai_reply("cached answer"))
        .expect(1)
        .create_async()
        .await;

    let ctx = fixture.file_context(dir.path());
    let build = || {
        Query::new(ctx.clone(), &ModelConfig::new("gpt-4o", "k"))
            .unwrap()
            .system("s")
            .user("u")
    };

    let first = build().execute().await.unwrap();
    let second = build().execute().await.unwrap();
    assert_eq!(first, second);
    mock.assert_async().await;

    let key: CacheKey = build().cache_key();
    let path = dir.path().join(format!("{}.json", key.as_str()));
    let stored: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(stored["response"], json!("cached answer"));
    assert_eq!(stored["request"]["model"], json!("gpt-4o"));
    assert_eq!(stored["request"]["jsonMode"], json!(false));
    assert!(stored["timestamp"].as_str().is_some());
}
