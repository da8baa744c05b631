//! 沙箱 - 每个组件独立的 QuickJS 运行时
//!
//! Sandbox: one QuickJS runtime per compiled component.
//!
//! Each unit of evaluation (module evaluation, render, event) runs under a
//! wall-clock budget enforced by the engine's interrupt handler, next to a
//! heap limit and a native stack limit. Exhausting any of them surfaces as an
//! [`EvalError`]; generated code cannot catch a budget interrupt.
//!
//! No JavaScript value is ever held on the Rust side between calls: all
//! component state lives in the runtime behind the frozen `__worksheet`
//! global, so dropping the sandbox frees everything.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use rquickjs::function::Rest;
use rquickjs::{Context, Ctx, Function, Object, Runtime, Value};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::registry::REGISTRY;
use super::EvalLimits;

const PRELUDE: &str = include_str!("prelude.js");

/// Global the prelude installs the host runtime under.
pub const HOST_GLOBAL: &str = "__worksheet";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    /// A JavaScript exception, described as `Name: message`.
    #[error("{0}")]
    Thrown(String),

    #[error("time budget of {0} ms exceeded")]
    Budget(u64),

    #[error("engine error: {0}")]
    Engine(String),
}

pub type EvalResult<T> = std::result::Result<T, EvalError>;

/// Conversion of engine results into [`EvalError`], taking the pending
/// exception out of the context.
pub trait JsResultExt<T> {
    fn or_thrown(self, ctx: &Ctx<'_>) -> EvalResult<T>;
}

impl<T> JsResultExt<T> for rquickjs::Result<T> {
    fn or_thrown(self, ctx: &Ctx<'_>) -> EvalResult<T> {
        self.map_err(|err| caught(ctx, err))
    }
}

fn caught(ctx: &Ctx<'_>, err: rquickjs::Error) -> EvalError {
    if matches!(err, rquickjs::Error::Exception) {
        let thrown = ctx.catch();
        EvalError::Thrown(describe(ctx, thrown))
    } else {
        EvalError::Engine(err.to_string())
    }
}

fn describe<'js>(ctx: &Ctx<'js>, thrown: Value<'js>) -> String {
    let described = ctx
        .globals()
        .get::<_, Object>(HOST_GLOBAL)
        .and_then(|host| host.get::<_, Function>("describe"))
        .and_then(|describe| describe.call::<_, String>((thrown,)));
    match described {
        Ok(text) => text,
        Err(_) => {
            let _ = ctx.catch();
            "Error: unprintable exception".to_string()
        }
    }
}

/// Wall-clock allowance for the current unit of evaluation.
#[derive(Clone)]
pub struct Budget {
    state: Rc<BudgetState>,
}

struct BudgetState {
    limit: Duration,
    deadline: Cell<Option<Instant>>,
    exhausted: Cell<bool>,
}

impl Budget {
    fn new(limit_ms: u64) -> Self {
        Self {
            state: Rc::new(BudgetState {
                limit: Duration::from_millis(limit_ms),
                deadline: Cell::new(None),
                exhausted: Cell::new(false),
            }),
        }
    }

    fn start(&self) {
        self.state.deadline.set(Some(Instant::now() + self.state.limit));
        self.state.exhausted.set(false);
    }

    /// Push the deadline back, e.g. by the time spent in a host function.
    fn extend(&self, by: Duration) {
        if let Some(deadline) = self.state.deadline.get() {
            self.state.deadline.set(Some(deadline + by));
        }
    }

    /// Interrupt handler: `true` stops the running script.
    fn interrupt(&self) -> bool {
        match self.state.deadline.get() {
            Some(deadline) if Instant::now() >= deadline => {
                self.state.exhausted.set(true);
                true
            }
            _ => false,
        }
    }

    fn exhausted(&self) -> bool {
        self.state.exhausted.get()
    }

    pub fn limit_ms(&self) -> u64 {
        self.state.limit.as_millis() as u64
    }
}

/// Error a host function reports to generated code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostError {
    pub name: String,
    pub message: String,
}

impl HostError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

pub type HostFn = Rc<dyn Fn(&[JsonValue]) -> Result<JsonValue, HostError>>;

/// A value placed in the generated code's global scope.
///
/// Functions take and return JSON; async ones hand generated code an
/// already-settled promise.
#[derive(Clone)]
pub enum HostValue {
    Json(JsonValue),
    Function { func: HostFn, returns_promise: bool },
}

impl HostValue {
    pub fn function<F>(func: F) -> Self
    where
        F: Fn(&[JsonValue]) -> Result<JsonValue, HostError> + 'static,
    {
        HostValue::Function {
            func: Rc::new(func),
            returns_promise: false,
        }
    }

    pub fn async_function<F>(func: F) -> Self
    where
        F: Fn(&[JsonValue]) -> Result<JsonValue, HostError> + 'static,
    {
        HostValue::Function {
            func: Rc::new(func),
            returns_promise: true,
        }
    }
}

impl From<JsonValue> for HostValue {
    fn from(value: JsonValue) -> Self {
        HostValue::Json(value)
    }
}

impl std::fmt::Debug for HostValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HostValue::Json(value) => f.debug_tuple("Json").field(value).finish(),
            HostValue::Function { returns_promise, .. } => f
                .debug_struct("Function")
                .field("returns_promise", returns_promise)
                .finish_non_exhaustive(),
        }
    }
}

/// One isolated JavaScript runtime with the host prelude installed.
pub struct Sandbox {
    context: Context,
    runtime: Runtime,
    budget: Budget,
}

impl Sandbox {
    pub fn new(limits: &EvalLimits) -> EvalResult<Self> {
        let runtime = Runtime::new().map_err(|e| EvalError::Engine(e.to_string()))?;
        runtime.set_memory_limit(limits.memory_limit);
        runtime.set_max_stack_size(limits.max_stack_size);
        let budget = Budget::new(limits.time_budget_ms);
        let watch = budget.clone();
        runtime.set_interrupt_handler(Some(Box::new(move || watch.interrupt())));
        let context = Context::full(&runtime).map_err(|e| EvalError::Engine(e.to_string()))?;

        let sandbox = Self {
            context,
            runtime,
            budget,
        };
        let manifest = REGISTRY.manifest().to_string();
        sandbox.begin();
        sandbox.with(|ctx| {
            let install: Function = ctx.eval(PRELUDE).or_thrown(ctx)?;
            let log = Function::new(ctx.clone(), console_line).or_thrown(ctx)?;
            install.call::<_, ()>((manifest, log)).or_thrown(ctx)
        })?;
        Ok(sandbox)
    }

    /// Start a new unit of evaluation with a full time budget.
    pub fn begin(&self) {
        self.budget.start();
    }

    pub fn budget(&self) -> &Budget {
        &self.budget
    }

    /// Run `f` inside the context, then drain the promise job queue.
    ///
    /// Any failure after the budget ran out is reported as
    /// [`EvalError::Budget`], whatever the script saw.
    pub fn with<R, F>(&self, f: F) -> EvalResult<R>
    where
        F: for<'js> FnOnce(&Ctx<'js>) -> EvalResult<R>,
    {
        let result = self.context.with(|ctx| f(&ctx)).and_then(|value| {
            self.drain_jobs()?;
            Ok(value)
        });
        result.map_err(|err| {
            if self.budget.exhausted() {
                EvalError::Budget(self.budget.limit_ms())
            } else {
                err
            }
        })
    }

    fn drain_jobs(&self) -> EvalResult<()> {
        loop {
            match self.runtime.execute_pending_job() {
                Ok(true) => continue,
                Ok(false) => return Ok(()),
                Err(_) => {
                    let message = self.context.with(|ctx| {
                        let thrown = ctx.catch();
                        describe(&ctx, thrown)
                    });
                    return Err(EvalError::Thrown(message));
                }
            }
        }
    }

    /// Bind `name` in the global scope.
    pub fn define(&self, name: &str, value: &HostValue) -> EvalResult<()> {
        let budget = self.budget.clone();
        self.with(|ctx| {
            let js = match value {
                HostValue::Json(json) => {
                    let host: Object = ctx.globals().get(HOST_GLOBAL).or_thrown(ctx)?;
                    let from_json: Function = host.get("fromJson").or_thrown(ctx)?;
                    from_json.call::<_, Value>((json.to_string(),)).or_thrown(ctx)?
                }
                HostValue::Function { func, returns_promise } => {
                    host_function(ctx, func.clone(), budget, *returns_promise)
                        .or_thrown(ctx)?
                        .into_value()
                }
            };
            ctx.globals().set(name, js).or_thrown(ctx)
        })
    }

    /// Heap bytes currently in use by the runtime.
    pub fn memory_used(&self) -> i64 {
        self.runtime.memory_usage().memory_used_size
    }
}

fn console_line(level: String, message: String) {
    match level.as_str() {
        "error" => error!(target: "worksheet_runtime::console", "{}", message),
        "warn" => warn!(target: "worksheet_runtime::console", "{}", message),
        "debug" => debug!(target: "worksheet_runtime::console", "{}", message),
        _ => info!(target: "worksheet_runtime::console", "{}", message),
    }
}

fn host_function<'js>(
    ctx: &Ctx<'js>,
    func: HostFn,
    budget: Budget,
    returns_promise: bool,
) -> rquickjs::Result<Function<'js>> {
    Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<Value<'js>> {
            let host: Object = ctx.globals().get(HOST_GLOBAL)?;
            let to_json: Function = host.get("toJson")?;
            let mut json_args = Vec::with_capacity(args.0.len());
            for arg in args.0 {
                let text: Option<String> = to_json.call((arg,))?;
                let json = text
                    .and_then(|t| serde_json::from_str(&t).ok())
                    .unwrap_or(JsonValue::Null);
                json_args.push(json);
            }

            // Time spent in the host (an LLM call, say) is not charged to the script.
            let started = Instant::now();
            let result = func(&json_args);
            budget.extend(started.elapsed());

            if returns_promise {
                let settle: Function = host.get("settle")?;
                return match result {
                    Ok(value) => settle.call((true, value.to_string())),
                    Err(err) => settle.call((false, err.name, err.message)),
                };
            }
            match result {
                Ok(value) => {
                    let from_json: Function = host.get("fromJson")?;
                    from_json.call((value.to_string(),))
                }
                Err(err) => {
                    let make_error: Function = host.get("makeError")?;
                    let error: Value = make_error.call((err.name, err.message))?;
                    Err(ctx.throw(error))
                }
            }
        },
    )
}
