//! 渲染宿主
//!
//! Rendering host for compiled components.
//!
//! A [`RenderHost`] owns one compiled component and its sandbox. It
//! renders the component into a [`UiNode`] tree, keeps hook state between
//! renders, routes UI events to the handlers recorded during the last render
//! and contains every failure behind an error boundary.

pub mod boundary;
pub mod bridge;
pub mod render;
pub mod runtime;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

pub use boundary::{fallback_node, FALLBACK_TITLE};
pub use bridge::{answer_checker_value, AnswerChecker, LlmAnswerChecker};
pub use render::RenderHost;

/// Key of the JSON object that stands in for a function-valued prop.
pub const HANDLER_REF: &str = "$handler";

/// A rendered node. Element ids are stable across renders as long as the
/// component tree keeps its shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UiNode {
    Text(String),
    Element {
        id: String,
        kind: String,
        props: Map<String, JsonValue>,
        children: Vec<UiNode>,
    },
}

impl UiNode {
    pub fn id(&self) -> Option<&str> {
        match self {
            UiNode::Element { id, .. } => Some(id),
            UiNode::Text(_) => None,
        }
    }

    pub fn kind(&self) -> Option<&str> {
        match self {
            UiNode::Element { kind, .. } => Some(kind),
            UiNode::Text(_) => None,
        }
    }

    pub fn prop(&self, name: &str) -> Option<&JsonValue> {
        match self {
            UiNode::Element { props, .. } => props.get(name),
            UiNode::Text(_) => None,
        }
    }

    pub fn children(&self) -> &[UiNode] {
        match self {
            UiNode::Element { children, .. } => children,
            UiNode::Text(_) => &[],
        }
    }

    /// Whether `prop` was a function at render time.
    pub fn has_handler(&self, prop: &str) -> bool {
        self.prop(prop)
            .and_then(|p| p.get(HANDLER_REF))
            .is_some()
    }

    /// Concatenated text of this node and its descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            UiNode::Text(text) => out.push_str(text),
            UiNode::Element { children, .. } => {
                for child in children {
                    child.collect_text(out);
                }
            }
        }
    }

    /// Depth-first search, this node included.
    pub fn find<P>(&self, predicate: P) -> Option<&UiNode>
    where
        P: Fn(&UiNode) -> bool,
    {
        self.find_ref(&predicate)
    }

    fn find_ref(&self, predicate: &dyn Fn(&UiNode) -> bool) -> Option<&UiNode> {
        if predicate(self) {
            return Some(self);
        }
        self.children().iter().find_map(|child| child.find_ref(predicate))
    }

    /// Every matching node in document order.
    pub fn find_all<P>(&self, predicate: P) -> Vec<&UiNode>
    where
        P: Fn(&UiNode) -> bool,
    {
        let mut found = Vec::new();
        self.collect(&predicate, &mut found);
        found
    }

    fn collect<'a>(&'a self, predicate: &dyn Fn(&UiNode) -> bool, found: &mut Vec<&'a UiNode>) {
        if predicate(self) {
            found.push(self);
        }
        for child in self.children() {
            child.collect(predicate, found);
        }
    }

    pub fn find_by_id(&self, id: &str) -> Option<&UiNode> {
        self.find(|node| node.id() == Some(id))
    }

    pub fn find_kind(&self, kind: &str) -> Option<&UiNode> {
        self.find(|node| node.kind() == Some(kind))
    }

    pub fn find_all_kind(&self, kind: &str) -> Vec<&UiNode> {
        self.find_all(|node| node.kind() == Some(kind))
    }
}

/// Result of a render: the tree, or the boundary fallback and the error text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RenderOutcome {
    Rendered(UiNode),
    Failed { fallback: UiNode, error: String },
}

impl RenderOutcome {
    /// The node to display, whichever way the render went.
    pub fn tree(&self) -> &UiNode {
        match self {
            RenderOutcome::Rendered(tree) => tree,
            RenderOutcome::Failed { fallback, .. } => fallback,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, RenderOutcome::Failed { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            RenderOutcome::Failed { error, .. } => Some(error),
            RenderOutcome::Rendered(_) => None,
        }
    }
}
