//! JavaScript/JSX syntax trees from tree-sitter.
//!
//! Every walk here is iterative: nesting in generated source is bounded by
//! [`MAX_NESTING_DEPTH`], never by the native stack.

use tree_sitter::{Node, Parser, Tree};

use super::CompileError;

/// Deepest syntax tree accepted. Deeper sources fail with a parse error.
pub const MAX_NESTING_DEPTH: usize = 400;

/// Parse JavaScript with JSX, rejecting syntax errors and runaway nesting.
pub fn parse(source: &str) -> Result<Tree, CompileError> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_javascript::LANGUAGE.into())
        .map_err(|e| CompileError::Unsupported(format!("JavaScript grammar unavailable: {}", e)))?;
    let tree = parser.parse(source, None).ok_or_else(|| CompileError::Parse {
        line: 1,
        col: 1,
        message: "Parser produced no syntax tree".into(),
    })?;

    let has_error = tree.root_node().has_error();
    let mut first_error = None;
    preorder(&tree, |node, depth| {
        if depth > MAX_NESTING_DEPTH {
            return Err(parse_error(node, format!("Nesting deeper than {} levels", MAX_NESTING_DEPTH)));
        }
        if has_error && first_error.is_none() && (node.is_error() || node.is_missing()) {
            first_error = Some(syntax_error(node, source));
        }
        Ok(())
    })?;

    match first_error {
        Some(err) => Err(err),
        None if has_error => Err(parse_error(tree.root_node(), "Invalid syntax".into())),
        None => Ok(tree),
    }
}

/// Visit every node in document order with its depth below the root.
pub fn preorder<'t, F>(tree: &'t Tree, mut visit: F) -> Result<(), CompileError>
where
    F: FnMut(Node<'t>, usize) -> Result<(), CompileError>,
{
    let mut cursor = tree.walk();
    let mut depth = 0;
    loop {
        visit(cursor.node(), depth)?;
        if cursor.goto_first_child() {
            depth += 1;
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return Ok(());
            }
            depth -= 1;
        }
    }
}

/// Source text of a node.
pub fn text<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    &source[node.start_byte()..node.end_byte()]
}

/// Named children, comments excluded.
pub fn named_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|child| child.kind() != "comment")
        .collect()
}

/// Contents of a string literal without its quotes.
pub fn string_contents<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    let raw = text(node, source);
    if raw.len() >= 2 {
        &raw[1..raw.len() - 1]
    } else {
        raw
    }
}

pub fn parse_error(node: Node<'_>, message: String) -> CompileError {
    let position = node.start_position();
    CompileError::Parse {
        line: position.row + 1,
        col: position.column + 1,
        message,
    }
}

fn syntax_error(node: Node<'_>, source: &str) -> CompileError {
    if node.is_missing() {
        return parse_error(node, format!("Missing `{}`", node.kind()));
    }
    let snippet: String = text(node, source).chars().take(24).collect();
    let snippet = snippet.lines().next().unwrap_or_default().trim().to_string();
    if snippet.is_empty() {
        parse_error(node, "Unexpected end of input".into())
    } else {
        parse_error(node, format!("Unexpected `{}`", snippet))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_jsx_module() {
        let tree = parse("import { Button } from '@mantine/core';\nexport default () => <Button>Go</Button>;").unwrap();
        assert_eq!(tree.root_node().kind(), "program");
        assert!(!tree.root_node().has_error());
    }

    #[test]
    fn test_syntax_error_position() {
        match parse("const a = 1;\nconst = 2;") {
            Err(CompileError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_unclosed_jsx_is_rejected() {
        assert!(matches!(parse("const x = <div><span></div>;"), Err(CompileError::Parse { .. })));
    }

    #[test]
    fn test_deep_nesting_is_a_parse_error() {
        let deep = format!("const x = {}1{};", "(".repeat(2_000), ")".repeat(2_000));
        match parse(&deep) {
            Err(CompileError::Parse { message, .. }) => assert!(message.contains("Nesting deeper")),
            other => panic!("unexpected: {:?}", other),
        }

        let moderate = format!("const x = {}1{};", "(".repeat(100), ")".repeat(100));
        assert!(parse(&moderate).is_ok());
    }

    #[test]
    fn test_preorder_depths() {
        let tree = parse("a;").unwrap();
        let mut kinds = Vec::new();
        preorder(&tree, |node, depth| {
            kinds.push((node.kind(), depth));
            Ok(())
        })
        .unwrap();
        assert_eq!(kinds[0], ("program", 0));
        assert!(kinds.contains(&("identifier", 2)));
    }
}
