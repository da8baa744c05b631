//! Generated worksheet from compile to graded feedback

use std::rc::Rc;
use std::sync::Arc;

use mockito::Matcher;
use serde_json::json;
use worksheet_runtime::config::ApiKeys;
use worksheet_runtime::generate::{AnswerResult, CheckAnswerRequest, CheckAnswerResponse};
use worksheet_runtime::host::FALLBACK_TITLE;
use worksheet_runtime::{
    answer_checker_value, extract_guarded_code, ClientConfig, CompileError, CompileRequest, Compiler, EvalLimits,
    Error, HostValue, LlmAnswerChecker, RenderHost, RenderOutcome, RuntimeContext, UiNode,
};

use crate::mock_server::{gemini_json_reply, MockServerFixture};

const GENERATED: &str = r#"Below is the worksheet.

```jsx
import React, { useState, useMemo } from 'react';
import { Stack, Title, Text, TextInput, NumberInput, Radio, Select, Button, Group, Loader, Alert, Table } from '@mantine/core';

const QUESTIONS = [
  { id: 'capital', kind: 'text', prompt: 'Capital of France' },
  { id: 'sum', kind: 'number', prompt: '7 + 5' },
  { id: 'planet', kind: 'radio', prompt: 'Largest planet', options: ['Mars', 'Jupiter'] },
  { id: 'color', kind: 'select', prompt: 'Colour of the sky', options: ['blue', 'green'] },
];

function Feedback({ result }) {
  if (!result) return null;
  return (
    <Text c={result.isCorrect ? 'green' : 'red'}>
      {result.isCorrect ? '✓' : '✗'} {result.feedback}
    </Text>
  );
}

function Question({ question, value, onAnswer, result }) {
  const update = (v) => onAnswer(question.id, v);
  let input;
  switch (question.kind) {
    case 'number':
      input = <NumberInput value={value} onChange={update} />;
      break;
    case 'radio':
      input = (
        <Radio.Group value={value} onChange={update}>
          {question.options.map((o) => <Radio key={o} value={o} label={o} />)}
        </Radio.Group>
      );
      break;
    case 'select':
      input = <Select data={question.options} value={value} onChange={update} />;
      break;
    default:
      input = <TextInput value={value ?? ''} onChange={(e) => update(e.currentTarget.value)} />;
  }
  return (
    <Stack gap="xs">
      <Text fw={600}>{question.prompt}</Text>
      {input}
      <Feedback result={result} />
    </Stack>
  );
}

export default function Worksheet({ title = 'General knowledge' }) {
  const [answers, setAnswers] = useState({});
  const [results, setResults] = useState(null);
  const [loading, setLoading] = useState(false);
  const [error, setError] = useState(null);

  const answered = useMemo(() => Object.keys(answers).length, [answers]);
  const onAnswer = (id, value) => setAnswers((prev) => ({ ...prev, [id]: value }));

  async function check() {
    setLoading(true);
    setError(null);
    try {
      const response = await checkUserAnswers({
        globalContext: `${title} worksheet: ${QUESTIONS.map((q) => q.prompt).join('; ')}`,
        answers: QUESTIONS.map((q) => ({ answer: answers[q.id] ?? '', context: q.prompt })),
      });
      setResults(response.results);
    } catch (err) {
      setError(err.message);
    } finally {
      setLoading(false);
    }
  }

  const score = results ? results.filter((r) => r.isCorrect).length : 0;

  return (
    <Stack>
      <Title order={2}>{title}</Title>
      {QUESTIONS.map((q, i) => (
        <Question key={q.id} question={q} value={answers[q.id]} onAnswer={onAnswer} result={results?.[i]} />
      ))}
      <Group>
        <Button onClick={check} disabled={loading || answered === 0}>Check answers</Button>
        {loading && <Loader size="sm" />}
      </Group>
      {error && <Alert color="red" title="Could not check">{error}</Alert>}
      {results && (
        <Table>
          <Table.Tbody>
            <Table.Tr>
              <Table.Td>Score</Table.Td>
              <Table.Td>{score} / {QUESTIONS.length}</Table.Td>
            </Table.Tr>
          </Table.Tbody>
        </Table>
      )}
    </Stack>
  );
}
```

Each question is checked by the expert."#;

fn compiler() -> Compiler {
    Compiler::new(Arc::new(RuntimeContext::ephemeral().unwrap()))
}

fn grade(request: CheckAnswerRequest) -> worksheet_runtime::Result<CheckAnswerResponse> {
    let expected = ["Paris", "12", "Jupiter", "blue"];
    Ok(CheckAnswerResponse {
        results: request
            .answers
            .iter()
            .zip(expected)
            .map(|(a, e)| AnswerResult {
                is_correct: a.answer == e,
                feedback: format!("expected {}", e),
            })
            .collect(),
    })
}

fn mount_with(checker: HostValue) -> RenderHost {
    let code = extract_guarded_code(GENERATED).app;
    let compiled = compiler()
        .compile(CompileRequest::new(code).with_context("checkUserAnswers", checker))
        .unwrap();
    RenderHost::mount(compiled, json!({ "title": "Quiz" }))
}

fn tree(outcome: RenderOutcome) -> UiNode {
    match outcome {
        RenderOutcome::Rendered(tree) => tree,
        RenderOutcome::Failed { error, .. } => panic!("render failed: {}", error),
    }
}

fn id(tree: &UiNode, kind: &str) -> String {
    tree.find_kind(kind).and_then(UiNode::id).unwrap().to_string()
}

fn answer_all(host: &mut RenderHost) -> UiNode {
    let t = tree(host.render());
    host.change_value(&id(&t, "TextInput"), json!("Paris")).unwrap();
    host.change_value(&id(&t, "NumberInput"), json!(11)).unwrap();
    host.change_value(&id(&t, "Radio.Group"), json!("Jupiter")).unwrap();
    tree(host.change_value(&id(&t, "Select"), json!("blue")).unwrap())
}

#[test]
fn test_worksheet_renders_questions() {
    let mut host = mount_with(answer_checker_value(Rc::new(grade)));
    let t = tree(host.render());

    assert_eq!(t.find_kind("Title").unwrap().text(), "Quiz");
    assert_eq!(t.find_all_kind("Radio").len(), 2);
    assert_eq!(t.find_kind("Select").unwrap().prop("data"), Some(&json!(["blue", "green"])));
    let button = t.find_kind("Button").unwrap();
    assert_eq!(button.prop("disabled"), Some(&json!(true)));
    assert!(t.find_kind("Table").is_none());
}

#[test]
fn test_answers_are_graded_and_shown() {
    let mut host = mount_with(answer_checker_value(Rc::new(grade)));
    let t = answer_all(&mut host);
    assert_eq!(t.find_kind("TextInput").unwrap().prop("value"), Some(&json!("Paris")));
    assert_eq!(t.find_kind("Button").unwrap().prop("disabled"), Some(&json!(false)));

    let t = tree(host.click(&id(&t, "Button")).unwrap());
    let feedback: Vec<String> = t
        .find_all(|n| n.kind() == Some("Text") && n.prop("c").is_some())
        .iter()
        .map(|n| n.text())
        .collect();
    assert_eq!(
        feedback,
        vec!["✓ expected Paris", "✗ expected 12", "✓ expected Jupiter", "✓ expected blue"]
    );
    let cells = t.find_all_kind("Table.Td");
    assert_eq!(cells[1].text(), "3 / 4");
    assert!(t.find_kind("Loader").is_none());
}

#[test]
fn test_checker_failure_shows_alert() {
    let failing = |_: CheckAnswerRequest| -> worksheet_runtime::Result<CheckAnswerResponse> {
        Err(Error::provider(503, "GeminiDriver", "overloaded"))
    };
    let mut host = mount_with(answer_checker_value(Rc::new(failing)));
    let t = answer_all(&mut host);
    let t = tree(host.click(&id(&t, "Button")).unwrap());
    let alert = t.find_kind("Alert").unwrap();
    assert_eq!(alert.prop("title"), Some(&json!("Could not check")));
    assert!(alert.text().starts_with("Failed to validate answer:"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_llm_checker_over_http() {
    let mut fixture = MockServerFixture::new().await;
    let mock = fixture
        .server
        .mock("POST", Matcher::Regex(r"^/v1beta/models/gemini-1\.5-flash-latest:generateContent".into()))
        .match_body(Matcher::Regex("Answer 1: Paris, Context: Capital of France".into()))
        .with_status(200)
        .with_body(gemini_json_reply(&json!({
            "results": [
                {"isCorrect": true, "feedback": "Yes"},
                {"isCorrect": false, "feedback": "7 + 5 = 12"},
                {"isCorrect": true, "feedback": "Yes"},
                {"isCorrect": true, "feedback": "Yes"}
            ]
        })))
        .expect(1)
        .create_async()
        .await;

    let config = Arc::new(ClientConfig {
        api_keys: ApiKeys {
            gemini: Some("g".into()),
            ..ApiKeys::default()
        },
        ..ClientConfig::default()
    });
    let checker = LlmAnswerChecker::new(fixture.context(), config);
    let mut host = mount_with(answer_checker_value(Rc::new(checker)));
    let t = answer_all(&mut host);
    let t = tree(host.click(&id(&t, "Button")).unwrap());

    assert_eq!(t.find_all_kind("Table.Td")[1].text(), "3 / 4");
    assert!(t.text().contains("✗ 7 + 5 = 12"));
    mock.assert_async().await;
}

#[test]
fn test_throwing_component_is_contained_per_host() {
    let broken = compiler()
        .compile(CompileRequest::new(
            "export default function Broken({ items }) { return <ul>{items.map((i) => <li>{i}</li>)}</ul>; }",
        ))
        .unwrap();
    let mut broken = RenderHost::mount(broken, json!({}));
    let mut healthy = mount_with(answer_checker_value(Rc::new(grade)));

    let outcome = broken.render();
    assert!(outcome.is_failed());
    assert_eq!(outcome.tree().prop("title"), Some(&json!(FALLBACK_TITLE)));
    assert!(outcome.error().unwrap().contains("TypeError"));

    assert!(!healthy.render().is_failed());
    let fixed = broken.set_props(json!({ "items": ["a", "b"] }));
    assert_eq!(tree(fixed).find_all_kind("li").len(), 2);
}

#[test]
fn test_unknown_module_is_rejected() {
    let result = compiler().compile(CompileRequest::new(
        "import axios from 'axios';\nexport default function App() { return null; }",
    ));
    assert!(matches!(result, Err(Error::Compilation(CompileError::UnknownModule(m))) if m == "axios"));
}

#[test]
fn test_unknown_import_name_is_rejected() {
    let result = compiler().compile(CompileRequest::new(
        "import { DatePicker } from '@mantine/core';\nexport default () => <DatePicker />;",
    ));
    assert!(matches!(
        result,
        Err(Error::Compilation(CompileError::UnknownImport { ref name, .. })) if name == "DatePicker"
    ));
}

#[test]
fn test_runaway_render_is_stopped_by_time_budget() {
    let ctx = RuntimeContext::ephemeral().unwrap().with_limits(EvalLimits {
        time_budget_ms: 150,
        ..EvalLimits::default()
    });
    let compiled = Compiler::new(Arc::new(ctx))
        .compile(CompileRequest::new(
            "export default function Spin() { while (true) {} return null; }",
        ))
        .unwrap();
    let mut host = RenderHost::mount(compiled, json!({}));
    let outcome = host.render();
    assert_eq!(outcome.error(), Some("time budget of 150 ms exceeded"));
}

#[test]
fn test_mantine_v7_layout_components_render() {
    let compiled = compiler()
        .compile(CompileRequest::new(
            r#"import { useState } from 'react';
import { Accordion, Fieldset, Slider, Stepper, Text } from '@mantine/core';

export default function Lesson() {
  const [level, setLevel] = useState(3);
  return (
    <Fieldset legend="Settings">
      <Slider min={1} max={10} value={level} onChange={setLevel} />
      <Accordion defaultValue="hint">
        <Accordion.Item value="hint">
          <Accordion.Control>Hint</Accordion.Control>
          <Accordion.Panel><Text>Level {level}</Text></Accordion.Panel>
        </Accordion.Item>
      </Accordion>
      <Stepper active={0}>
        <Stepper.Step label="Read" />
        <Stepper.Completed>Done</Stepper.Completed>
      </Stepper>
    </Fieldset>
  );
}"#,
        ))
        .unwrap();
    let mut host = RenderHost::mount(compiled, json!({}));
    let t = tree(host.render());
    assert_eq!(t.kind(), Some("Fieldset"));
    assert_eq!(t.prop("legend"), Some(&json!("Settings")));
    assert_eq!(t.find_kind("Accordion.Item").unwrap().prop("value"), Some(&json!("hint")));
    assert_eq!(t.find_kind("Stepper.Step").unwrap().prop("label"), Some(&json!("Read")));

    let slider = t.find_kind("Slider").and_then(UiNode::id).unwrap().to_string();
    let t = tree(host.change_value(&slider, json!(7)).unwrap());
    assert_eq!(t.find_kind("Accordion.Panel").unwrap().text(), "Level 7");
}
