//! Error boundary around a generated component.

use serde_json::{json, Map};
use tracing::error;
use uuid::Uuid;

use super::{RenderOutcome, UiNode};
use crate::compiler::EvalError;

pub const FALLBACK_TITLE: &str = "User Component Error";
const FALLBACK_NOTICE: &str = "An error occurred when rendering the dynamic component.";
const FALLBACK_ID: &str = "boundary";

/// The panel shown in place of a component that failed.
pub fn fallback_node(message: &str) -> UiNode {
    let mut props = Map::new();
    props.insert("title".into(), json!(FALLBACK_TITLE));
    props.insert("color".into(), json!("red"));
    UiNode::Element {
        id: FALLBACK_ID.into(),
        kind: "Alert".into(),
        props,
        children: vec![
            UiNode::Element {
                id: format!("{}.0", FALLBACK_ID),
                kind: "Text".into(),
                props: Map::new(),
                children: vec![UiNode::Text(FALLBACK_NOTICE.into())],
            },
            UiNode::Element {
                id: format!("{}.1", FALLBACK_ID),
                kind: "Code".into(),
                props: Map::new(),
                children: vec![UiNode::Text(message.into())],
            },
        ],
    }
}

/// Log the failure and turn it into a fallback outcome.
pub(crate) fn contain(host_id: Uuid, err: &EvalError) -> RenderOutcome {
    let message = err.to_string();
    error!(host_id = %host_id, error = %message, "Caught error in generated component");
    RenderOutcome::Failed {
        fallback: fallback_node(&message),
        error: message,
    }
}
