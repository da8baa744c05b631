//! Typed access to the in-sandbox host runtime (`__worksheet`).
//!
//! Hook slots, handlers and timers live inside the sandbox; the render walk
//! drives them through this facade one call at a time.

use rquickjs::function::IntoArgs;
use rquickjs::{Ctx, FromJs, Function, Object, Value};
use serde_json::Value as JsonValue;

use crate::compiler::{EvalResult, JsResultExt, HOST_GLOBAL};

const ELEMENT_TAG: &str = "worksheet.element";

pub struct HostRuntime<'js> {
    ctx: Ctx<'js>,
    host: Object<'js>,
}

impl<'js> HostRuntime<'js> {
    pub fn new(ctx: &Ctx<'js>) -> EvalResult<Self> {
        let host = ctx.globals().get(HOST_GLOBAL).or_thrown(ctx)?;
        Ok(Self { ctx: ctx.clone(), host })
    }

    pub fn ctx(&self) -> &Ctx<'js> {
        &self.ctx
    }

    fn call<A, R>(&self, method: &str, args: A) -> EvalResult<R>
    where
        A: IntoArgs<'js>,
        R: FromJs<'js>,
    {
        let func: Function<'js> = self.host.get(method).or_thrown(&self.ctx)?;
        func.call(args).or_thrown(&self.ctx)
    }

    pub fn begin_pass(&self) -> EvalResult<()> {
        self.call("beginPass", ())
    }

    /// Forget hook state of components that were not rendered this pass.
    pub fn end_pass(&self) -> EvalResult<()> {
        self.call("endPass", ())
    }

    /// Call a function component with hooks bound to `path`.
    pub fn render_component(&self, component: Value<'js>, props: Object<'js>, path: &str) -> EvalResult<Value<'js>> {
        self.call("renderComponent", (component, props, path))
    }

    /// Run queued effects; returns how many ran.
    pub fn run_effects(&self) -> EvalResult<u32> {
        self.call("runEffects", ())
    }

    pub fn discard_effects(&self) -> EvalResult<()> {
        self.call("discardEffects", ())
    }

    /// Whether state changed since the last call.
    pub fn take_dirty(&self) -> EvalResult<bool> {
        self.call("takeDirty", ())
    }

    /// Number of mounted components holding hook state.
    pub fn component_count(&self) -> EvalResult<u32> {
        self.call("componentCount", ())
    }

    pub fn set_handler(&self, id: &str, prop: &str, handler: Value<'js>) -> EvalResult<()> {
        self.call("setHandler", (id, prop, handler))
    }

    /// Call a recorded handler with JSON arguments.
    pub fn invoke(&self, id: &str, prop: &str, args: &[JsonValue]) -> EvalResult<()> {
        self.call("invoke", (id, prop, JsonValue::from(args.to_vec()).to_string()))
    }

    /// Call a recorded handler with a synthetic event around `target`.
    pub fn invoke_event(&self, id: &str, prop: &str, target: &JsonValue) -> EvalResult<()> {
        self.call("invokeEvent", (id, prop, target.to_string()))
    }

    /// Run due `setTimeout` callbacks; returns how many ran.
    pub fn run_timers(&self) -> EvalResult<u32> {
        self.call("runTimers", ())
    }

    /// Descriptions of promise rejections from async handlers since the last call.
    pub fn take_rejections(&self) -> EvalResult<Vec<String>> {
        let json: String = self.call("takeRejections", ())?;
        Ok(serde_json::from_str(&json).unwrap_or_default())
    }

    /// The root element for the registered component with `props`.
    pub fn root_element(&self, props: &JsonValue) -> EvalResult<Value<'js>> {
        self.call("rootElement", (props.to_string(),))
    }

    /// JSON form of a value; `None` for functions, `undefined` and cycles.
    pub fn to_json(&self, value: Value<'js>) -> EvalResult<Option<JsonValue>> {
        let text: Option<String> = self.call("toJson", (value,))?;
        Ok(text.and_then(|t| serde_json::from_str(&t).ok()))
    }

    /// `String(value)`.
    pub fn text(&self, value: Value<'js>) -> EvalResult<String> {
        self.call("text", (value,))
    }

    /// `typeof`, with `null` reported as such.
    pub fn type_of(&self, value: Value<'js>) -> EvalResult<String> {
        self.call("typeOf", (value,))
    }

    /// The value as an element object, if it is one.
    pub fn element(&self, value: &Value<'js>) -> EvalResult<Option<Object<'js>>> {
        let Some(object) = value.as_object() else {
            return Ok(None);
        };
        if value.is_function() {
            return Ok(None);
        }
        let tag: Option<String> = object.get("$$typeof").or_thrown(&self.ctx)?;
        Ok((tag.as_deref() == Some(ELEMENT_TAG)).then(|| object.clone()))
    }

    /// Host kind of a component created from the registry, e.g. `Grid.Col`.
    pub fn host_kind(&self, component: &Value<'js>) -> EvalResult<Option<String>> {
        match component.as_object() {
            Some(object) if component.is_function() => object.get("$$host").or_thrown(&self.ctx),
            _ => Ok(None),
        }
    }
}
