//! Tree rendering and event dispatch.

use std::collections::{HashMap, HashSet};

use rquickjs::{Object, Value};
use serde_json::{json, Map, Value as JsonValue};
use tracing::{debug, warn};
use uuid::Uuid;

use super::runtime::HostRuntime;
use super::{boundary, RenderOutcome, UiNode, HANDLER_REF};
use crate::compiler::{CompiledComponent, EvalError, EvalResult, JsResultExt, Sandbox};
use crate::{Error, Result};

/// Effects may update state; a render settles after at most this many passes.
const MAX_RENDER_PASSES: usize = 25;

/// Deepest element tree a render may produce.
pub const MAX_RENDER_DEPTH: usize = 256;

const ROOT_PATH: &str = "0";
const FRAGMENT_KIND: &str = "Fragment";

/// Components whose `onChange` receives the new value instead of an event.
const VALUE_CHANGE_KINDS: &[&str] = &[
    "NumberInput",
    "Select",
    "MultiSelect",
    "Autocomplete",
    "TagsInput",
    "SegmentedControl",
    "Radio.Group",
    "Checkbox.Group",
    "Chip.Group",
    "Switch.Group",
    "Slider",
    "RangeSlider",
    "Rating",
    "ColorInput",
    "ColorPicker",
    "PinInput",
    "Pagination",
    "Tabs",
];

/// Handlers and node kinds recorded during the last render.
#[derive(Default)]
struct HandlerTable {
    handlers: HashSet<(String, String)>,
    kinds: HashMap<String, String>,
}

impl HandlerTable {
    fn clear(&mut self) {
        self.handlers.clear();
        self.kinds.clear();
    }

    fn has(&self, id: &str, prop: &str) -> bool {
        self.handlers.contains(&(id.to_string(), prop.to_string()))
    }

    fn kind(&self, id: &str) -> Option<&str> {
        self.kinds.get(id).map(String::as_str)
    }
}

/// How a recorded handler is called.
enum Call<'a> {
    Args(&'a [JsonValue]),
    Event(JsonValue),
}

/// One mounted component.
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use worksheet_runtime::{CompileRequest, Compiler, RenderHost, RuntimeContext};
/// # fn run() -> worksheet_runtime::Result<()> {
/// let compiler = Compiler::new(Arc::new(RuntimeContext::ephemeral()?));
/// let compiled = compiler.compile(CompileRequest::new(
///     "export default () => <Button onClick={() => {}}>Go</Button>;",
/// ))?;
/// let mut host = RenderHost::mount(compiled, serde_json::json!({}));
/// let outcome = host.render();
/// let button = outcome.tree().find_kind("Button").and_then(|b| b.id()).map(String::from);
/// if let Some(id) = button {
///     host.click(&id)?;
/// }
/// # Ok(()) }
/// ```
pub struct RenderHost {
    id: Uuid,
    props: JsonValue,
    sandbox: Sandbox,
    table: HandlerTable,
    outcome: Option<RenderOutcome>,
}

impl RenderHost {
    pub fn mount(compiled: CompiledComponent, props: JsonValue) -> Self {
        let id = compiled.id();
        Self {
            id,
            props: root_props(props),
            sandbox: compiled.into_sandbox(),
            table: HandlerTable::default(),
            outcome: None,
        }
    }

    /// Compile id of the mounted component, used in logs.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Outcome of the most recent render or failed event.
    pub fn outcome(&self) -> Option<&RenderOutcome> {
        self.outcome.as_ref()
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    /// Replace the root props and re-render.
    pub fn set_props(&mut self, props: JsonValue) -> RenderOutcome {
        self.props = root_props(props);
        self.render()
    }

    /// Render until state settles. Failures are contained, never returned.
    pub fn render(&mut self) -> RenderOutcome {
        let outcome = match self.render_settled() {
            Ok(tree) => RenderOutcome::Rendered(tree),
            Err(err) => boundary::contain(self.id, &err),
        };
        self.outcome = Some(outcome.clone());
        outcome
    }

    fn render_settled(&mut self) -> EvalResult<UiNode> {
        self.sandbox.begin();
        self.sandbox.with(|ctx| {
            let rt = HostRuntime::new(ctx)?;
            rt.take_dirty()?;
            rt.discard_effects()
        })?;

        let props = &self.props;
        for pass in 1..=MAX_RENDER_PASSES {
            self.sandbox.begin();
            let table = &mut self.table;
            let tree = self.sandbox.with(|ctx| {
                let rt = HostRuntime::new(ctx)?;
                let tree = render_tree(&rt, table, props)?;
                rt.run_effects()?;
                Ok(tree)
            })?;
            let dirty = self.sandbox.with(|ctx| HostRuntime::new(ctx)?.take_dirty())?;
            if !dirty {
                debug!(host_id = %self.id, passes = pass, "Rendered component");
                return Ok(tree);
            }
        }
        Err(EvalError::Thrown(
            "Error: Too many re-renders. The component keeps updating state during render or in effects.".into(),
        ))
    }

    /// Call a recorded handler with JSON arguments, then re-render.
    pub fn dispatch(&mut self, node_id: &str, handler: &str, args: &[JsonValue]) -> Result<RenderOutcome> {
        self.invoke(node_id, handler, Call::Args(args))
    }

    /// Deliver a new input value through `onChange`.
    ///
    /// Value-style components (`Select`, `NumberInput`, ...) get the value
    /// itself, everything else a synthetic change event.
    pub fn change_value(&mut self, node_id: &str, value: JsonValue) -> Result<RenderOutcome> {
        let value_style = matches!(self.table.kind(node_id), Some(kind) if VALUE_CHANGE_KINDS.contains(&kind));
        if value_style {
            return self.invoke(node_id, "onChange", Call::Args(std::slice::from_ref(&value)));
        }
        let checked = value.as_bool().unwrap_or(false);
        let target = json!({ "value": value, "checked": checked });
        self.invoke(node_id, "onChange", Call::Event(target))
    }

    /// Click a node. A submit button without its own `onClick` submits the
    /// closest enclosing form. Disabled nodes ignore clicks.
    pub fn click(&mut self, node_id: &str) -> Result<RenderOutcome> {
        let node = self.rendered_node(node_id);
        if node.and_then(|n| n.prop("disabled")) == Some(&JsonValue::Bool(true)) {
            debug!(host_id = %self.id, node = node_id, "Ignoring click on disabled node");
            return Ok(self.render());
        }
        let is_submit = node.and_then(|n| n.prop("type")).and_then(JsonValue::as_str) == Some("submit");
        if !self.table.has(node_id, "onClick") && is_submit {
            if let Some(form) = self.enclosing_form(node_id) {
                return self.submit(&form);
            }
        }
        self.invoke(node_id, "onClick", Call::Event(json!({})))
    }

    pub fn submit(&mut self, node_id: &str) -> Result<RenderOutcome> {
        self.invoke(node_id, "onSubmit", Call::Event(json!({})))
    }

    /// Run queued `setTimeout` callbacks, then re-render.
    pub fn flush_timers(&mut self) -> Result<RenderOutcome> {
        self.sandbox.begin();
        if let Err(err) = self.run_timers() {
            return Err(self.fail(&err));
        }
        Ok(self.render())
    }

    fn run_timers(&self) -> EvalResult<()> {
        // Promise continuations drained between rounds may queue more timers.
        while self.sandbox.with(|ctx| HostRuntime::new(ctx)?.run_timers())? > 0 {}
        Ok(())
    }

    fn rendered_node(&self, node_id: &str) -> Option<&UiNode> {
        match &self.outcome {
            Some(RenderOutcome::Rendered(tree)) => tree.find_by_id(node_id),
            _ => None,
        }
    }

    fn enclosing_form(&self, node_id: &str) -> Option<String> {
        self.table
            .handlers
            .iter()
            .filter(|(id, prop)| prop == "onSubmit" && node_id.starts_with(&format!("{}.", id)))
            .map(|(id, _)| id.clone())
            .max_by_key(String::len)
    }

    fn invoke(&mut self, node_id: &str, prop: &str, call: Call<'_>) -> Result<RenderOutcome> {
        if !self.table.has(node_id, prop) {
            return Err(Error::Render {
                message: format!("Node '{}' has no '{}' handler", node_id, prop),
            });
        }
        debug!(host_id = %self.id, node = node_id, handler = prop, "Dispatching event");

        self.sandbox.begin();
        let result = self
            .sandbox
            .with(|ctx| {
                let rt = HostRuntime::new(ctx)?;
                match &call {
                    Call::Args(args) => rt.invoke(node_id, prop, args),
                    Call::Event(target) => rt.invoke_event(node_id, prop, target),
                }
            })
            .and_then(|_| self.run_timers())
            .and_then(|_| self.sandbox.with(|ctx| HostRuntime::new(ctx)?.take_rejections()));
        match result {
            Ok(rejections) => {
                for reason in rejections {
                    warn!(
                        host_id = %self.id,
                        handler = prop,
                        reason = %reason,
                        "Unhandled promise rejection in event handler"
                    );
                }
            }
            Err(err) => return Err(self.fail(&err)),
        }
        Ok(self.render())
    }

    fn fail(&mut self, err: &EvalError) -> Error {
        let outcome = boundary::contain(self.id, err);
        let message = outcome.error().unwrap_or_default().to_string();
        self.outcome = Some(outcome);
        Error::Render { message }
    }
}

fn root_props(props: JsonValue) -> JsonValue {
    match props {
        obj @ JsonValue::Object(_) => obj,
        _ => json!({}),
    }
}

fn thrown(name: &str, message: String) -> EvalError {
    EvalError::Thrown(format!("{}: {}", name, message))
}

fn render_tree<'js>(rt: &HostRuntime<'js>, table: &mut HandlerTable, props: &JsonValue) -> EvalResult<UiNode> {
    table.clear();
    rt.begin_pass()?;

    let root = rt.root_element(props)?;
    let mut out = Vec::new();
    render_value(rt, table, &root, ROOT_PATH, 0, &mut out)?;
    rt.end_pass()?;

    if out.len() == 1 {
        if let Some(node) = out.pop() {
            return Ok(node);
        }
    }
    Ok(UiNode::Element {
        id: "root".into(),
        kind: FRAGMENT_KIND.into(),
        props: Map::new(),
        children: out,
    })
}

fn child_path<'js>(rt: &HostRuntime<'js>, path: &str, child: &Value<'js>, index: usize) -> EvalResult<String> {
    if let Some(element) = rt.element(child)? {
        let key: Option<String> = element.get("key").or_thrown(rt.ctx())?;
        if let Some(key) = key {
            return Ok(format!("{}.${}", path, key));
        }
    }
    Ok(format!("{}.{}", path, index))
}

fn render_value<'js>(
    rt: &HostRuntime<'js>,
    table: &mut HandlerTable,
    value: &Value<'js>,
    path: &str,
    depth: usize,
    out: &mut Vec<UiNode>,
) -> EvalResult<()> {
    if depth > MAX_RENDER_DEPTH {
        return Err(thrown(
            "RangeError",
            format!("Maximum render depth of {} exceeded", MAX_RENDER_DEPTH),
        ));
    }
    if value.is_undefined() || value.is_null() || value.is_bool() {
        return Ok(());
    }
    if let Some(text) = value.as_string() {
        out.push(UiNode::Text(text.to_string().or_thrown(rt.ctx())?));
        return Ok(());
    }
    if value.is_number() {
        out.push(UiNode::Text(rt.text(value.clone())?));
        return Ok(());
    }
    if let Some(items) = value.as_array() {
        for (index, item) in items.iter::<Value>().enumerate() {
            let item = item.or_thrown(rt.ctx())?;
            let item_path = child_path(rt, path, &item, index)?;
            render_value(rt, table, &item, &item_path, depth + 1, out)?;
        }
        return Ok(());
    }
    if value.is_function() {
        warn!(path, "Functions are not valid as a child; skipped");
        return Ok(());
    }
    if let Some(element) = rt.element(value)? {
        return render_element(rt, table, &element, path, depth + 1, out);
    }
    let found = match value.as_object() {
        Some(object) => {
            let keys = object
                .keys::<String>()
                .collect::<rquickjs::Result<Vec<_>>>()
                .or_thrown(rt.ctx())?;
            format!("object with keys {{{}}}", keys.join(", "))
        }
        None => rt.type_of(value.clone())?,
    };
    Err(thrown(
        "Error",
        format!("Objects are not valid as a React child (found: {})", found),
    ))
}

fn render_children<'js>(
    rt: &HostRuntime<'js>,
    table: &mut HandlerTable,
    props: &Object<'js>,
    path: &str,
    depth: usize,
    out: &mut Vec<UiNode>,
) -> EvalResult<()> {
    let children: Value = props.get("children").or_thrown(rt.ctx())?;
    if children.is_array() {
        return render_value(rt, table, &children, path, depth, out);
    }
    let child_path = child_path(rt, path, &children, 0)?;
    render_value(rt, table, &children, &child_path, depth, out)
}

fn render_element<'js>(
    rt: &HostRuntime<'js>,
    table: &mut HandlerTable,
    element: &Object<'js>,
    path: &str,
    depth: usize,
    out: &mut Vec<UiNode>,
) -> EvalResult<()> {
    let kind: Value = element.get("type").or_thrown(rt.ctx())?;
    let props: Object = element.get("props").or_thrown(rt.ctx())?;

    let host_kind = match kind.as_string() {
        Some(name) => Some(name.to_string().or_thrown(rt.ctx())?),
        None if kind.is_function() => rt.host_kind(&kind)?,
        None => {
            return Err(thrown(
                "TypeError",
                format!("Element type is invalid: got {}", rt.type_of(kind.clone())?),
            ))
        }
    };

    match host_kind {
        None => {
            let rendered = rt.render_component(kind, props, path)?;
            render_value(rt, table, &rendered, &format!("{}.0", path), depth, out)
        }
        Some(name) if name == FRAGMENT_KIND => render_children(rt, table, &props, path, depth, out),
        Some(name) => {
            let node_props = host_props(rt, table, &props, path, depth)?;
            let mut children = Vec::new();
            render_children(rt, table, &props, path, depth, &mut children)?;
            table.kinds.insert(path.to_string(), name.clone());
            out.push(UiNode::Element {
                id: path.to_string(),
                kind: name,
                props: node_props,
                children,
            });
            Ok(())
        }
    }
}

/// JSON props of a host node. Functions are recorded as handlers, element
/// props (`icon`, `leftSection`) render as nested trees.
fn host_props<'js>(
    rt: &HostRuntime<'js>,
    table: &mut HandlerTable,
    props: &Object<'js>,
    path: &str,
    depth: usize,
) -> EvalResult<Map<String, JsonValue>> {
    let mut out = Map::new();
    for entry in props.props::<String, Value>() {
        let (name, value) = entry.or_thrown(rt.ctx())?;
        if name == "children" {
            continue;
        }
        if value.is_function() {
            rt.set_handler(path, &name, value)?;
            table.handlers.insert((path.to_string(), name.clone()));
            out.insert(name.clone(), json!({ HANDLER_REF: name }));
        } else if rt.element(&value)?.is_some() {
            let mut nested = Vec::new();
            render_value(rt, table, &value, &format!("{}.@{}", path, name), depth, &mut nested)?;
            let json = match nested.len() {
                0 => JsonValue::Null,
                1 => serde_json::to_value(&nested[0]).unwrap_or_default(),
                _ => serde_json::to_value(&nested).unwrap_or_default(),
            };
            out.insert(name, json);
        } else if let Some(json) = rt.to_json(value)? {
            out.insert(name, json);
        }
    }
    Ok(out)
}
