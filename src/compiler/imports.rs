//! Import collection and the normalizing rewrite that replaces module
//! syntax with registry bindings and an `exports` record.

use serde::Serialize;
use tree_sitter::{Node, Tree};

use super::lower::{lower_jsx, Edits};
use super::registry::CapabilityRegistry;
use super::syntax::{self, named_children, parse, text};
use super::CompileError;

/// Scope name of the module table the rewritten program reads from.
pub const MODULES_BINDING: &str = "__modules";
/// Scope name of the record the rewritten program writes exports into.
pub const EXPORTS_BINDING: &str = "exports";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "imported", rename_all = "camelCase")]
pub enum BindingKind {
    Default,
    Named(String),
    Namespace,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ImportBinding {
    pub local: String,
    pub kind: BindingKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportedModule {
    pub specifier: String,
    pub bindings: Vec<ImportBinding>,
}

/// Module specifiers in first-appearance order with their deduplicated bindings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportTable {
    modules: Vec<ImportedModule>,
}

impl ImportTable {
    /// Collect the top-level `import` declarations of a parsed module.
    pub fn collect(tree: &Tree, source: &str) -> Self {
        let mut table = Self::default();
        for stmt in named_children(tree.root_node()) {
            if stmt.kind() != "import_statement" {
                continue;
            }
            let Some(specifier) = stmt.child_by_field_name("source") else {
                continue;
            };
            let module = table.module_mut(syntax::string_contents(specifier, source));
            for binding in import_bindings(stmt, source) {
                if !module.bindings.contains(&binding) {
                    module.bindings.push(binding);
                }
            }
        }
        table
    }

    fn module_mut(&mut self, specifier: &str) -> &mut ImportedModule {
        let idx = match self.modules.iter().position(|m| m.specifier == specifier) {
            Some(idx) => idx,
            None => {
                self.modules.push(ImportedModule {
                    specifier: specifier.to_string(),
                    bindings: Vec::new(),
                });
                self.modules.len() - 1
            }
        };
        &mut self.modules[idx]
    }

    pub fn modules(&self) -> &[ImportedModule] {
        &self.modules
    }

    pub fn specifiers(&self) -> impl Iterator<Item = &str> {
        self.modules.iter().map(|m| m.specifier.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Reject any specifier or imported name the registry does not provide.
    pub fn validate(&self, registry: &CapabilityRegistry) -> Result<(), CompileError> {
        for module in &self.modules {
            let spec = registry
                .module(&module.specifier)
                .ok_or_else(|| CompileError::UnknownModule(module.specifier.clone()))?;
            for binding in &module.bindings {
                if let BindingKind::Named(name) = &binding.kind {
                    if !spec.has_export(name) {
                        return Err(CompileError::UnknownImport {
                            module: module.specifier.clone(),
                            name: name.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

fn import_bindings(stmt: Node<'_>, source: &str) -> Vec<ImportBinding> {
    let mut bindings = Vec::new();
    let Some(clause) = named_children(stmt).into_iter().find(|n| n.kind() == "import_clause") else {
        return bindings;
    };
    for part in named_children(clause) {
        match part.kind() {
            "identifier" => bindings.push(ImportBinding {
                local: text(part, source).to_string(),
                kind: BindingKind::Default,
            }),
            "namespace_import" => {
                if let Some(local) = named_children(part).into_iter().find(|n| n.kind() == "identifier") {
                    bindings.push(ImportBinding {
                        local: text(local, source).to_string(),
                        kind: BindingKind::Namespace,
                    });
                }
            }
            "named_imports" => {
                for specifier in named_children(part) {
                    let Some(name) = specifier.child_by_field_name("name") else {
                        continue;
                    };
                    let imported = match name.kind() {
                        "string" => syntax::string_contents(name, source),
                        _ => text(name, source),
                    };
                    let local = specifier
                        .child_by_field_name("alias")
                        .map(|alias| text(alias, source))
                        .unwrap_or(imported);
                    bindings.push(ImportBinding {
                        local: local.to_string(),
                        kind: if imported == "default" {
                            BindingKind::Default
                        } else {
                            BindingKind::Named(imported.to_string())
                        },
                    });
                }
            }
            _ => {}
        }
    }
    bindings
}

/// A module body ready for evaluation as a function body.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedModule {
    /// Import bindings followed by the rewritten source.
    pub code: String,
    pub imports: ImportTable,
    /// Exported names in declaration order.
    pub exports: Vec<String>,
}

impl NormalizedModule {
    /// Name of the export the component is taken from.
    pub fn entry_export(&self) -> Result<&str, CompileError> {
        if let Some(default) = self.exports.iter().find(|n| n.as_str() == "default") {
            return Ok(default.as_str());
        }
        match self.exports.as_slice() {
            [] => Err(CompileError::NoExports),
            [only] => Ok(only.as_str()),
            many => Err(CompileError::AmbiguousExports(many.to_vec())),
        }
    }

    /// The body wrapped as `(function (exports, __modules) { ... })`.
    pub fn wrapped(&self) -> String {
        format!(
            "(function ({}, {}) {{\n\"use strict\";\n{}\n}})",
            EXPORTS_BINDING, MODULES_BINDING, self.code
        )
    }
}

fn binding_prelude(imports: &ImportTable) -> String {
    let mut prelude = String::new();
    for module in imports.modules() {
        let lookup = format!("{}[{}]", MODULES_BINDING, serde_json::Value::from(module.specifier.as_str()));
        let mut named = Vec::new();
        for binding in &module.bindings {
            match &binding.kind {
                BindingKind::Default | BindingKind::Namespace => {
                    prelude.push_str(&format!("const {} = {};\n", binding.local, lookup));
                }
                BindingKind::Named(imported) if *imported == binding.local => named.push(imported.clone()),
                BindingKind::Named(imported) => named.push(format!("{}: {}", imported, binding.local)),
            }
        }
        if !named.is_empty() {
            prelude.push_str(&format!("const {{ {} }} = {};\n", named.join(", "), lookup));
        }
    }
    prelude
}

/// Same number of newlines as `text`, so later line numbers stay put.
fn blank_lines(text: &str) -> String {
    "\n".repeat(text.matches('\n').count())
}

fn export_assignment(exported: &str, local: &str) -> String {
    format!(" {}.{} = {};", EXPORTS_BINDING, exported, local)
}

fn is_default_export(stmt: Node<'_>) -> bool {
    let mut cursor = stmt.walk();
    let found = stmt
        .children(&mut cursor)
        .any(|child| !child.is_named() && child.kind() == "default");
    found
}

/// Identifiers a declaration pattern binds, in source order.
fn pattern_names(pattern: Node<'_>, source: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut stack = vec![pattern];
    while let Some(node) = stack.pop() {
        match node.kind() {
            "identifier" | "shorthand_property_identifier_pattern" => names.push(text(node, source).to_string()),
            "assignment_pattern" | "object_assignment_pattern" => stack.extend(node.child_by_field_name("left")),
            "pair_pattern" => stack.extend(node.child_by_field_name("value")),
            "object_pattern" | "array_pattern" | "rest_pattern" => {
                stack.extend(named_children(node).into_iter().rev());
            }
            _ => {}
        }
    }
    names
}

fn declared_names(decl: Node<'_>, source: &str) -> Vec<String> {
    match decl.kind() {
        "lexical_declaration" | "variable_declaration" => named_children(decl)
            .into_iter()
            .filter(|d| d.kind() == "variable_declarator")
            .filter_map(|d| d.child_by_field_name("name"))
            .flat_map(|pattern| pattern_names(pattern, source))
            .collect(),
        _ => decl
            .child_by_field_name("name")
            .map(|name| vec![text(name, source).to_string()])
            .unwrap_or_default(),
    }
}

fn reject_dynamic_imports(tree: &Tree) -> Result<(), CompileError> {
    syntax::preorder(tree, |node, _| {
        let dynamic = node.kind() == "call_expression"
            && node.child_by_field_name("function").is_some_and(|f| f.kind() == "import");
        if dynamic {
            return Err(CompileError::Unsupported("dynamic import() is not supported".into()));
        }
        Ok(())
    })
}

/// Rewrite top-level module syntax, returning the exported names.
///
/// Declarations keep their position with `exports.<name> = <name>` right
/// after them; `export { a as b }` lists are assigned at the end.
fn rewrite_module(tree: &Tree, source: &str, edits: &mut Edits) -> Result<Vec<String>, CompileError> {
    let mut exports = Vec::new();
    let mut trailing = String::new();

    for stmt in named_children(tree.root_node()) {
        let (start, end) = (stmt.start_byte(), stmt.end_byte());
        match stmt.kind() {
            "import_statement" => edits.replace(start, end, blank_lines(text(stmt, source))),
            "export_statement" => {
                if stmt.child_by_field_name("source").is_some() {
                    return Err(CompileError::Unsupported(format!(
                        "re-exports are not supported: {}",
                        text(stmt, source).lines().next().unwrap_or_default()
                    )));
                }
                let declaration = stmt.child_by_field_name("declaration");
                let value = stmt.child_by_field_name("value");
                if is_default_export(stmt) {
                    exports.push("default".to_string());
                    match (declaration, value) {
                        (Some(decl), _) => {
                            let name = decl.child_by_field_name("name").map(|n| text(n, source));
                            let Some(name) = name else {
                                return Err(syntax::parse_error(decl, "Default export declaration needs a name".into()));
                            };
                            edits.replace(start, decl.start_byte(), "");
                            edits.insert(end, export_assignment("default", name));
                        }
                        (None, Some(value)) => {
                            edits.replace(start, value.start_byte(), format!("{}.default = ", EXPORTS_BINDING));
                        }
                        (None, None) => return Err(syntax::parse_error(stmt, "Empty default export".into())),
                    }
                } else if let Some(decl) = declaration {
                    edits.replace(start, decl.start_byte(), "");
                    for name in declared_names(decl, source) {
                        edits.insert(end, export_assignment(&name, &name));
                        exports.push(name);
                    }
                } else if let Some(clause) = named_children(stmt).into_iter().find(|n| n.kind() == "export_clause") {
                    for specifier in named_children(clause) {
                        let Some(local) = specifier.child_by_field_name("name") else {
                            continue;
                        };
                        let local = text(local, source);
                        let exported = specifier
                            .child_by_field_name("alias")
                            .map(|alias| text(alias, source))
                            .unwrap_or(local);
                        trailing.push_str(&export_assignment(exported, local));
                        exports.push(exported.to_string());
                    }
                    edits.replace(start, end, blank_lines(text(stmt, source)));
                } else {
                    return Err(CompileError::Unsupported(format!(
                        "export form is not supported: {}",
                        text(stmt, source).lines().next().unwrap_or_default()
                    )));
                }
            }
            _ => {}
        }
    }
    if !trailing.is_empty() {
        edits.insert(source.len(), format!("\n{}", trailing.trim_start()));
    }
    Ok(exports)
}

/// Parse, collect and validate imports, then lower JSX and rewrite module
/// syntax. Nothing here evaluates code.
pub fn normalize(source: &str, registry: &CapabilityRegistry) -> Result<NormalizedModule, CompileError> {
    let tree = parse(source)?;
    let imports = ImportTable::collect(&tree, source);
    imports.validate(registry)?;
    reject_dynamic_imports(&tree)?;

    let mut edits = Edits::default();
    lower_jsx(&tree, source, &mut edits)?;
    let exports = rewrite_module(&tree, source, &mut edits)?;

    let mut code = binding_prelude(&imports);
    code.push_str(&edits.apply(source));
    Ok(NormalizedModule { code, imports, exports })
}
