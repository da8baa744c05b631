//! 动态组件编译器
//!
//! Dynamic component compiler: turns generated JSX source into a callable
//! component inside an isolated QuickJS runtime.
//!
//! The pipeline is parse (tree-sitter), lower JSX, validate imports against
//! the [`registry`], rewrite module syntax, then evaluate under the
//! [`EvalLimits`]. Nothing is evaluated before every import has been checked.

pub mod imports;
pub mod lower;
pub mod registry;
pub mod sandbox;
pub mod syntax;

use std::sync::Arc;

use rquickjs::{Function, Object, Value};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::context::RuntimeContext;

pub use imports::{normalize, BindingKind, ImportBinding, ImportTable, ImportedModule, NormalizedModule};
pub use registry::{Capability, CapabilityRegistry, ModuleSpec, REGISTRY};
pub use sandbox::{EvalError, EvalResult, HostError, HostValue, JsResultExt, Sandbox, HOST_GLOBAL};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("Syntax error at {line}:{col}: {message}")]
    Parse { line: usize, col: usize, message: String },

    #[error("Unknown module '{0}'")]
    UnknownModule(String),

    #[error("Module '{module}' has no export named '{name}'")]
    UnknownImport { module: String, name: String },

    #[error("Component source has no exports")]
    NoExports,

    #[error("Component source has several exports and no default: {}", .0.join(", "))]
    AmbiguousExports(Vec<String>),

    #[error("Evaluation failed: {0}")]
    Runtime(String),

    #[error("Evaluation exceeded the time budget of {0} ms")]
    Budget(u64),

    #[error("Unsupported syntax: {0}")]
    Unsupported(String),
}

impl From<EvalError> for CompileError {
    fn from(err: EvalError) -> Self {
        match err {
            EvalError::Budget(ms) => CompileError::Budget(ms),
            other => CompileError::Runtime(other.to_string()),
        }
    }
}

/// Bounds on a single unit of evaluation (compile, render pass, event).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EvalLimits {
    /// Wall-clock allowance per unit, in milliseconds.
    pub time_budget_ms: u64,
    /// Heap ceiling of each component runtime, in bytes.
    pub memory_limit: usize,
    /// Native stack the engine may use, in bytes.
    pub max_stack_size: usize,
}

impl Default for EvalLimits {
    fn default() -> Self {
        Self {
            time_budget_ms: 2_000,
            memory_limit: 64 * 1024 * 1024,
            max_stack_size: 1024 * 1024,
        }
    }
}

pub struct CompileRequest {
    pub code: String,
    /// Extra scope entries, at minimum `checkUserAnswers`.
    pub user_context: Vec<(String, HostValue)>,
}

impl CompileRequest {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            user_context: Vec::new(),
        }
    }

    pub fn with_context(mut self, name: impl Into<String>, value: HostValue) -> Self {
        self.user_context.push((name.into(), value));
        self
    }
}

/// A compiled component: the sandbox that owns it, with the component
/// registered as the render root.
pub struct CompiledComponent {
    id: Uuid,
    export: Option<String>,
    sandbox: Sandbox,
}

impl CompiledComponent {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Export the component was taken from; `None` for empty source.
    pub fn export_name(&self) -> Option<&str> {
        self.export.as_deref()
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    pub fn into_sandbox(self) -> Sandbox {
        self.sandbox
    }
}

pub struct Compiler {
    ctx: Arc<RuntimeContext>,
}

impl Compiler {
    pub fn new(ctx: Arc<RuntimeContext>) -> Self {
        Self { ctx }
    }

    /// Compile generated source into a component.
    ///
    /// Every failure is logged with the offending source attached.
    pub fn compile(&self, request: CompileRequest) -> crate::Result<CompiledComponent> {
        let id = Uuid::new_v4();
        match self.compile_inner(id, request.code.as_str(), &request.user_context) {
            Ok(compiled) => {
                info!(
                    compile_id = %id,
                    export = compiled.export_name().unwrap_or("<empty>"),
                    heap_bytes = compiled.sandbox.memory_used(),
                    "Compiled component"
                );
                Ok(compiled)
            }
            Err(err) => {
                error!(compile_id = %id, error = %err, source = %request.code, "Failed to compile component");
                Err(err.into())
            }
        }
    }

    fn compile_inner(
        &self,
        id: Uuid,
        code: &str,
        user_context: &[(String, HostValue)],
    ) -> Result<CompiledComponent, CompileError> {
        // Reject bad source before paying for a runtime.
        let module = if code.trim().is_empty() {
            None
        } else {
            Some(normalize(code, &REGISTRY)?)
        };

        let sandbox = Sandbox::new(&self.ctx.limits)?;
        for (name, value) in user_context {
            sandbox.define(name, value)?;
        }
        sandbox.begin();

        let Some(module) = module else {
            sandbox.with(|ctx| {
                let empty: Function = ctx
                    .eval("(function EmptyComponent() { return null; })")
                    .or_thrown(ctx)?;
                set_root(ctx, empty)
            })?;
            return Ok(CompiledComponent {
                id,
                export: None,
                sandbox,
            });
        };

        let entry = module.entry_export()?.to_string();
        debug!(
            compile_id = %id,
            modules = ?module.imports.specifiers().collect::<Vec<_>>(),
            code = %module.code,
            "Normalized component source"
        );

        let wrapped = module.wrapped();
        let kind = sandbox.with(|ctx| {
            let factory: Function = ctx.eval(wrapped).or_thrown(ctx)?;
            let host: Object = ctx.globals().get(HOST_GLOBAL).or_thrown(ctx)?;
            let modules: Value = host.get("modules").or_thrown(ctx)?;
            let exports = Object::new(ctx.clone()).or_thrown(ctx)?;
            factory.call::<_, ()>((exports.clone(), modules)).or_thrown(ctx)?;

            let component: Value = exports.get(entry.as_str()).or_thrown(ctx)?;
            if let Some(component) = component.as_function() {
                set_root(ctx, component.clone())?;
                return Ok(None);
            }
            let type_of: Function = host.get("typeOf").or_thrown(ctx)?;
            type_of.call::<_, String>((component,)).or_thrown(ctx).map(Some)
        })?;

        if let Some(kind) = kind {
            return Err(CompileError::Runtime(format!(
                "export '{}' is not a component (got {})",
                entry, kind
            )));
        }
        Ok(CompiledComponent {
            id,
            export: Some(entry),
            sandbox,
        })
    }
}

fn set_root<'js>(ctx: &rquickjs::Ctx<'js>, component: Function<'js>) -> EvalResult<()> {
    let host: Object = ctx.globals().get(HOST_GLOBAL).or_thrown(ctx)?;
    let set_root: Function = host.get("setRoot").or_thrown(ctx)?;
    set_root.call::<_, ()>((component,)).or_thrown(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use serde_json::json;

    fn compiler() -> Compiler {
        Compiler::new(Arc::new(RuntimeContext::ephemeral().unwrap()))
    }

    fn compile(code: &str) -> crate::Result<CompiledComponent> {
        compiler().compile(CompileRequest::new(code))
    }

    fn compile_err(code: &str) -> CompileError {
        match compile(code) {
            Err(Error::Compilation(err)) => err,
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("compiled unexpectedly"),
        }
    }

    fn limited(ms: u64) -> Compiler {
        let ctx = RuntimeContext::ephemeral().unwrap().with_limits(EvalLimits {
            time_budget_ms: ms,
            ..EvalLimits::default()
        });
        Compiler::new(Arc::new(ctx))
    }

    /// Evaluate an expression next to the compiled root and return it as JSON.
    fn root_call(compiled: &CompiledComponent, expr: &str) -> EvalResult<serde_json::Value> {
        let code = format!("(function (__root) {{ return JSON.stringify({}); }})", expr);
        compiled.sandbox().begin();
        compiled.sandbox().with(move |ctx| {
            let wrapper: Function = ctx.eval(code).or_thrown(ctx)?;
            let host: Object = ctx.globals().get(HOST_GLOBAL).or_thrown(ctx)?;
            let root_element: Function = host.get("rootElement").or_thrown(ctx)?;
            let element: Object = root_element.call(("{}",)).or_thrown(ctx)?;
            let root: Value = element.get("type").or_thrown(ctx)?;
            let text: Option<String> = wrapper.call((root,)).or_thrown(ctx)?;
            Ok(text.and_then(|t| serde_json::from_str(&t).ok()).unwrap_or_default())
        })
    }

    #[test]
    fn test_default_export_wins() {
        let compiled = compile(
            "import { Button } from '@mantine/core';\nexport const helper = () => 1;\nexport default function App() { return <Button>Go</Button>; }",
        )
        .unwrap();
        assert_eq!(compiled.export_name(), Some("default"));
        assert_eq!(root_call(&compiled, "__root.name").unwrap(), json!("App"));
    }

    #[test]
    fn test_single_named_export_is_used() {
        let compiled = compile("export function Worksheet() { return null; }").unwrap();
        assert_eq!(compiled.export_name(), Some("Worksheet"));
    }

    #[test]
    fn test_ambiguous_exports_fail() {
        assert_eq!(
            compile_err("export const A = () => null;\nexport const B = () => null;"),
            CompileError::AmbiguousExports(vec!["A".into(), "B".into()])
        );
        assert_eq!(compile_err("const A = 1;"), CompileError::NoExports);
    }

    #[test]
    fn test_unknown_module_fails_before_evaluation() {
        let err = compile_err("import fs from 'fs';\nwhile (true) {}\nexport default () => null;");
        assert_eq!(err, CompileError::UnknownModule("fs".into()));
    }

    #[test]
    fn test_time_budget_stops_module_evaluation() {
        let result = limited(100).compile(CompileRequest::new(
            "while (true) {}\nexport default function App() { return null; }",
        ));
        assert!(matches!(result, Err(Error::Compilation(CompileError::Budget(100)))));
    }

    #[test]
    fn test_empty_for_loop_is_charged() {
        let result = limited(100).compile(CompileRequest::new(
            "for (;;) {}\nexport default function App() { return null; }",
        ));
        assert!(matches!(result, Err(Error::Compilation(CompileError::Budget(100)))));

        let swallowed = limited(100).compile(CompileRequest::new(
            "try { for (;;) {} } catch (e) {}\nexport default function App() { return null; }",
        ));
        assert!(matches!(swallowed, Err(Error::Compilation(CompileError::Budget(100)))));
    }

    #[test]
    fn test_deep_recursion_and_nesting() {
        let compiled = compile(
            "function depth(n) { return n === 0 ? 0 : 1 + depth(n - 1); }\nexport default () => depth(200);",
        )
        .unwrap();
        assert_eq!(root_call(&compiled, "__root()").unwrap(), json!(200));

        match compile_err("function f() { return f(); }\nf();\nexport default () => null;") {
            CompileError::Runtime(message) => assert!(message.to_lowercase().contains("stack"), "{}", message),
            other => panic!("unexpected: {:?}", other),
        }

        let parens = format!("export default () => {}1{};", "(".repeat(100), ")".repeat(100));
        let compiled = compile(&parens).unwrap();
        assert_eq!(root_call(&compiled, "__root()").unwrap(), json!(1));

        let divs = format!("export default () => {}x{};", "<div>".repeat(50), "</div>".repeat(50));
        assert!(compile(&divs).is_ok());

        let too_deep = format!("export default () => {}1{};", "(".repeat(2_000), ")".repeat(2_000));
        assert!(matches!(compile_err(&too_deep), CompileError::Parse { .. }));
    }

    #[test]
    fn test_oversized_allocations_throw_range_error() {
        let compiled = compile(
            r#"const names = [() => 'ab'.repeat(2 ** 62), () => new Array(2 ** 40)].map((f) => {
  try { f(); return 'ok'; } catch (e) { return e.name; }
});
export default () => names;"#,
        )
        .unwrap();
        assert_eq!(root_call(&compiled, "__root()").unwrap(), json!(["RangeError", "RangeError"]));
    }

    #[test]
    fn test_standard_library_is_available() {
        let compiled = compile(
            r#"export default function App() {
  const tags = new Set(['a', 'b', 'a']);
  const scores = new Map([['ada', 3]]);
  const copy = structuredClone({ when: new Date(0), tags: [...tags] });
  return [tags.size, scores.get('ada'), copy.when.getTime(), copy.tags, 'Café'.normalize('NFC').length];
}"#,
        )
        .unwrap();
        assert_eq!(root_call(&compiled, "__root()").unwrap(), json!([2, 3, 0, ["a", "b"], 4]));
    }

    #[test]
    fn test_empty_source_is_noop_component() {
        let compiled = compile("   \n").unwrap();
        assert_eq!(compiled.export_name(), None);
        assert_eq!(root_call(&compiled, "__root()").unwrap(), json!(null));
    }

    #[test]
    fn test_user_context_is_in_scope() {
        let compiled = compiler()
            .compile(
                CompileRequest::new("export default () => [typeof checkUserAnswers, settings.level];")
                    .with_context("checkUserAnswers", HostValue::function(|_| Ok(json!(null))))
                    .with_context("settings", HostValue::from(json!({ "level": 2 }))),
            )
            .unwrap();
        assert_eq!(root_call(&compiled, "__root()").unwrap(), json!(["function", 2]));
    }

    #[test]
    fn test_runtime_error_during_evaluation() {
        match compile_err("const x = undefinedName + 1;\nexport default () => x;") {
            CompileError::Runtime(message) => {
                assert!(message.starts_with("ReferenceError"), "{}", message);
                assert!(message.contains("undefinedName"), "{}", message);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_non_component_export_rejected() {
        assert_eq!(
            compile_err("export default 42;"),
            CompileError::Runtime("export 'default' is not a component (got number)".into())
        );
    }
}
