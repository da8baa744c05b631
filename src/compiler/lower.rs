//! JSX lowering.
//!
//! JSX is rewritten in place into `_jsx(type, props, ...children)` calls by
//! byte-range edits on the original source. Nested elements never compose
//! strings: each element only edits its own tags, attributes and the gaps
//! between its children.

use tree_sitter::{Node, Tree};

use super::syntax::{self, named_children, text};
use super::CompileError;

/// Factory the lowered calls go through.
pub const JSX_FACTORY: &str = "_jsx";
/// Binding `<>...</>` lowers to.
pub const FRAGMENT_BINDING: &str = "_Fragment";

#[derive(Debug, Clone, PartialEq, Eq)]
struct Edit {
    start: usize,
    end: usize,
    text: String,
}

/// Non-overlapping source edits, applied in one pass.
#[derive(Debug, Default)]
pub struct Edits {
    edits: Vec<Edit>,
}

impl Edits {
    pub fn insert(&mut self, at: usize, text: impl Into<String>) {
        self.replace(at, at, text);
    }

    pub fn replace(&mut self, start: usize, end: usize, text: impl Into<String>) {
        self.edits.push(Edit {
            start,
            end,
            text: text.into(),
        });
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Apply all edits. At one offset, insertions go before replacements.
    pub fn apply(mut self, source: &str) -> String {
        self.edits.sort_by_key(|e| (e.start, e.start != e.end));
        let mut out = String::with_capacity(source.len() + self.edits.len() * 8);
        let mut pos = 0;
        for edit in &self.edits {
            if edit.start < pos {
                continue;
            }
            out.push_str(&source[pos..edit.start]);
            out.push_str(&edit.text);
            pos = edit.end;
        }
        out.push_str(&source[pos..]);
        out
    }
}

fn json_string(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| "\"\"".to_string())
}

/// Queue the edits that turn every JSX element in `tree` into factory calls.
pub fn lower_jsx(tree: &Tree, source: &str, edits: &mut Edits) -> Result<(), CompileError> {
    syntax::preorder(tree, |node, _| {
        match node.kind() {
            "jsx_element" => lower_element(node, source, edits),
            "jsx_self_closing_element" => {
                lower_tag(node, source, edits, true);
                Ok(())
            }
            _ => Ok(()),
        }
    })
}

fn element_type(name: Node<'_>, source: &str) -> String {
    let raw = text(name, source);
    match name.kind() {
        "identifier" => {
            let intrinsic = raw.contains('-') || raw.chars().next().is_some_and(|c| c.is_ascii_lowercase());
            if intrinsic {
                json_string(raw)
            } else {
                raw.to_string()
            }
        }
        "jsx_namespace_name" => json_string(raw),
        _ => raw.to_string(),
    }
}

/// Edit an opening or self-closing tag into the call head and props object.
fn lower_tag(tag: Node<'_>, source: &str, edits: &mut Edits, self_closing: bool) {
    let Some(name) = tag.child_by_field_name("name") else {
        edits.replace(tag.start_byte(), tag.end_byte(), format!("{}({}, null", JSX_FACTORY, FRAGMENT_BINDING));
        return;
    };
    let attributes: Vec<Node<'_>> = named_children(tag)
        .into_iter()
        .filter(|child| child.id() != name.id())
        .collect();

    let head = format!("{}({}, ", JSX_FACTORY, element_type(name, source));
    match attributes.first() {
        Some(first) => edits.replace(tag.start_byte(), first.start_byte(), head + "{"),
        None => edits.replace(tag.start_byte(), name.end_byte(), head + "null"),
    }

    let mut last = name;
    for (index, attribute) in attributes.iter().enumerate() {
        if index > 0 {
            edits.replace(last.end_byte(), attribute.start_byte(), ", ");
        }
        lower_attribute(*attribute, source, edits);
        last = *attribute;
    }

    let close = match (attributes.is_empty(), self_closing) {
        (true, true) => ")",
        (true, false) => "",
        (false, true) => "})",
        (false, false) => "}",
    };
    edits.replace(last.end_byte(), tag.end_byte(), close);
}

fn lower_attribute(attribute: Node<'_>, source: &str, edits: &mut Edits) {
    if attribute.kind() == "jsx_expression" {
        // `{...rest}` stays a spread inside the props object.
        edits.replace(attribute.start_byte(), attribute.start_byte() + 1, "");
        edits.replace(attribute.end_byte() - 1, attribute.end_byte(), "");
        return;
    }

    let parts = named_children(attribute);
    let Some(name) = parts.first() else {
        return;
    };
    let key = json_string(text(*name, source));
    let Some(value) = parts.get(1) else {
        edits.replace(attribute.start_byte(), attribute.end_byte(), format!("{}: true", key));
        return;
    };

    edits.replace(attribute.start_byte(), value.start_byte(), format!("{}: ", key));
    match value.kind() {
        "string" => {
            let decoded = decode_entities(syntax::string_contents(*value, source));
            edits.replace(value.start_byte(), value.end_byte(), json_string(&decoded));
        }
        "jsx_expression" => {
            edits.replace(value.start_byte(), value.start_byte() + 1, "(");
            edits.replace(value.end_byte() - 1, value.end_byte(), ")");
        }
        _ => {}
    }
}

fn lower_element(element: Node<'_>, source: &str, edits: &mut Edits) -> Result<(), CompileError> {
    let mut open = None;
    let mut close = None;
    let mut children = Vec::new();
    for child in named_children(element) {
        match child.kind() {
            "jsx_opening_element" => open = Some(child),
            "jsx_closing_element" => close = Some(child),
            "jsx_text" | "html_character_reference" => {}
            _ => children.push(child),
        }
    }
    let (Some(open), Some(close)) = (open, close) else {
        return Err(syntax::parse_error(element, "Malformed JSX element".into()));
    };

    lower_tag(open, source, edits, false);

    let mut gap_start = open.end_byte();
    for child in children {
        lower_text(gap_start, child.start_byte(), source, edits);
        match child.kind() {
            "jsx_expression" => lower_child_expression(child, edits),
            _ => edits.insert(child.start_byte(), ", "),
        }
        gap_start = child.end_byte();
    }
    lower_text(gap_start, close.start_byte(), source, edits);

    edits.replace(close.start_byte(), close.end_byte(), ")");
    Ok(())
}

fn lower_text(start: usize, end: usize, source: &str, edits: &mut Edits) {
    if start >= end {
        return;
    }
    let text = decode_entities(&source[start..end]);
    let replacement = match clean_jsx_text(&text) {
        Some(cleaned) => format!(", {}", json_string(&cleaned)),
        None => String::new(),
    };
    edits.replace(start, end, replacement);
}

fn lower_child_expression(container: Node<'_>, edits: &mut Edits) {
    let inner = named_children(container);
    let (start, end) = (container.start_byte(), container.end_byte());
    match inner.first() {
        None => edits.replace(start, end, ""),
        Some(expr) if expr.kind() == "spread_element" => {
            edits.replace(start, start + 1, ", ");
            edits.replace(end - 1, end, "");
        }
        Some(_) => {
            edits.replace(start, start + 1, ", (");
            edits.replace(end - 1, end, ")");
        }
    }
}

/// React's whitespace rule for JSX text: lines are trimmed, blank lines
/// dropped and the remaining lines joined with a single space.
pub fn clean_jsx_text(text: &str) -> Option<String> {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<&str> = normalized.split('\n').collect();
    let last_non_empty = lines
        .iter()
        .rposition(|line| line.chars().any(|c| c != ' ' && c != '\t'))
        .unwrap_or(0);

    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        let mut trimmed = line.replace('\t', " ");
        if i != 0 {
            trimmed = trimmed.trim_start_matches(' ').to_string();
        }
        if i != lines.len() - 1 {
            trimmed = trimmed.trim_end_matches(' ').to_string();
        }
        if !trimmed.is_empty() {
            if i != last_non_empty {
                trimmed.push(' ');
            }
            out.push_str(&trimmed);
        }
    }
    (!out.is_empty()).then_some(out)
}

/// Decode the HTML character references JSX text and attribute strings may contain.
pub fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(idx) = rest.find('&') {
        out.push_str(&rest[..idx]);
        rest = &rest[idx..];
        let decoded = rest.find(';').filter(|end| *end <= 10).and_then(|end| {
            let entity = &rest[1..end];
            let ch = match entity {
                "nbsp" => Some('\u{a0}'),
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "times" => Some('×'),
                "divide" => Some('÷'),
                "deg" => Some('°'),
                "minus" => Some('−'),
                "plusmn" => Some('±'),
                "le" => Some('≤'),
                "ge" => Some('≥'),
                "ne" => Some('≠'),
                "hellip" => Some('…'),
                "mdash" => Some('—'),
                "ndash" => Some('–'),
                _ if entity.starts_with("#x") || entity.starts_with("#X") => {
                    u32::from_str_radix(&entity[2..], 16).ok().and_then(char::from_u32)
                }
                _ if entity.starts_with('#') => entity[1..].parse::<u32>().ok().and_then(char::from_u32),
                _ => None,
            };
            ch.map(|c| (c, end))
        });
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
