//! Embedded script runtime that evaluates audit command text.
//!
//! One [`Sandbox`] is created per run. It owns a QuickJS runtime whose
//! global object exposes the [`HostCapabilities`] table under the names in
//! [`Capability`]. Each evaluation borrows the caller's
//! [`ExecutionContext`] for its duration; host calls made by the script see
//! that context and nothing else.
//!
//! # Example
//!
//! ```no_run
//! use hostaudit::config::AuditSpec;
//! use hostaudit::sandbox::{ExecutionContext, Sandbox};
//! # fn demo(sandbox: &Sandbox) -> Result<(), hostaudit::error_codes::AuditError> {
//! let audit = AuditSpec::new("greeting", "echo hallo");
//! let mut cx = ExecutionContext::for_audit(&audit);
//! sandbox.evaluate(&mut cx, &audit.command)?;
//! assert_eq!(cx.output(), Some("hallo"));
//! # Ok(())
//! # }
//! ```

pub mod capabilities;
pub mod context;
pub mod script;

pub use capabilities::{Capability, HostBridge, HostCapabilities, LogLevel};
pub use context::ExecutionContext;
pub use script::{ScriptFailure, classify, prepare};

use crate::compare::NOTHING_RETURNED;
use crate::error_codes::{AuditError, ErrorCode};
use crate::platform;
use crate::whitelist::Whitelist;
use rquickjs::convert::Coerced;
use rquickjs::{CatchResultExt, CaughtError, Context, Ctx, Exception, Function, Runtime, Value};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use tracing::debug;

/// The sandbox could not be created.
#[derive(Debug)]
pub struct SandboxError(rquickjs::Error);

impl fmt::Display for SandboxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot start script runtime: {}", self.0)
    }
}

impl std::error::Error for SandboxError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl From<rquickjs::Error> for SandboxError {
    fn from(err: rquickjs::Error) -> Self {
        Self(err)
    }
}

/// Host table and the context slot shared by every registered function.
#[derive(Clone)]
struct Bridge {
    host: Rc<dyn HostCapabilities>,
    slot: Rc<RefCell<ExecutionContext>>,
}

impl Bridge {
    /// Run one host call against the current context. A failure is stored
    /// in the context and rethrown into the script as an `Error` tagged with
    /// [`HOST_ERROR_TAG`].
    fn invoke<T>(
        &self,
        ctx: &Ctx<'_>,
        call: impl FnOnce(&dyn HostCapabilities, &mut ExecutionContext) -> Result<T, AuditError>,
    ) -> rquickjs::Result<T> {
        let mut cx = self.slot.borrow_mut();
        match call(self.host.as_ref(), &mut cx) {
            Ok(value) => Ok(value),
            Err(err) => {
                let message = err.message.clone();
                cx.record_error(err);
                drop(cx);
                Err(throw_host_error(ctx, &message))
            }
        }
    }
}

/// Property marking an exception thrown by a host capability.
const HOST_ERROR_TAG: &str = "__hostaudit_host_error";

fn throw_host_error(ctx: &Ctx<'_>, message: &str) -> rquickjs::Error {
    match Exception::from_message(ctx.clone(), message) {
        Ok(exception) => {
            if let Err(err) = exception.as_object().set(HOST_ERROR_TAG, true) {
                return err;
            }
            exception.throw()
        }
        Err(err) => err,
    }
}

/// How an evaluation ended, detached from the runtime's lifetimes.
enum Completion {
    Value(Option<String>),
    Failed(ScriptFailure),
}

/// A long-lived script runtime bound to one host capability table.
pub struct Sandbox {
    // Declared before `runtime` so it is dropped first.
    context: Context,
    #[allow(dead_code)]
    runtime: Runtime,
    bridge: Bridge,
    whitelist: Rc<Whitelist>,
}

impl fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sandbox")
            .field("capabilities", &Self::registered())
            .finish_non_exhaustive()
    }
}

impl Sandbox {
    /// Start a runtime and register every capability available on this
    /// platform.
    pub fn new(
        host: Rc<dyn HostCapabilities>,
        whitelist: Rc<Whitelist>,
    ) -> Result<Self, SandboxError> {
        let runtime = Runtime::new()?;
        let context = Context::full(&runtime)?;
        let bridge = Bridge {
            host,
            slot: Rc::new(RefCell::new(ExecutionContext::default())),
        };
        context.with(|ctx| register(&ctx, &bridge))?;
        debug!(capabilities = ?Self::registered(), "sandbox ready");

        Ok(Self {
            context,
            runtime,
            bridge,
            whitelist,
        })
    }

    /// Names registered in the global scope.
    #[must_use]
    pub fn registered() -> Vec<Capability> {
        Capability::available()
    }

    /// Evaluate an audit's command text against `cx`.
    ///
    /// On success `cx` holds the captured output: whatever a host capability
    /// set, or else the script's completion value ([`NOTHING_RETURNED`] for
    /// `undefined`).
    pub fn evaluate(&self, cx: &mut ExecutionContext, command: &str) -> Result<(), AuditError> {
        let source = prepare(command, &self.whitelist)?;
        debug!(audit = cx.audit_name(), source = %source, "evaluating");

        let _ = cx.take_error();
        self.bridge.slot.replace(std::mem::take(cx));
        let completion = self.context.with(|ctx| run(&ctx, source));
        *cx = self.bridge.slot.take();

        match completion {
            Completion::Value(value) => {
                let _ = cx.take_error();
                if cx.output().is_none() {
                    cx.set_output(value.unwrap_or_else(|| NOTHING_RETURNED.to_string()));
                }
                Ok(())
            }
            Completion::Failed(failure) => {
                // A host error the script caught must not mask what escaped.
                let recorded = cx.take_error().filter(|_| failure.raised_by_host);
                Err(recorded.unwrap_or_else(|| classify(&failure)))
            }
        }
    }
}

fn run(ctx: &Ctx<'_>, source: String) -> Completion {
    match ctx.eval::<Value, _>(source).catch(ctx) {
        Ok(value) => Completion::Value(render(ctx, &value)),
        Err(caught) => Completion::Failed(failure_of(ctx, caught)),
    }
}

/// Text form of a completion value; `None` for `undefined`.
fn render<'js>(ctx: &Ctx<'js>, value: &Value<'js>) -> Option<String> {
    if value.is_undefined() {
        return None;
    }
    if value.is_null() {
        return Some("null".to_string());
    }
    if let Some(s) = value.as_string() {
        return Some(s.to_string().unwrap_or_default());
    }
    if let Some(b) = value.as_bool() {
        return Some(b.to_string());
    }
    if let Some(i) = value.as_int() {
        return Some(i.to_string());
    }
    if let Some(n) = value.as_number() {
        return Some(render_number(n));
    }
    let json = ctx
        .json_stringify(value.clone())
        .ok()
        .flatten()
        .and_then(|s| s.to_string().ok());
    Some(json.unwrap_or_else(|| "[object]".to_string()))
}

/// Number formatting as scripts see it: no `.0` on integral values.
#[allow(clippy::float_cmp)]
fn render_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 9.0e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn failure_of<'js>(ctx: &Ctx<'js>, caught: CaughtError<'js>) -> ScriptFailure {
    match caught {
        CaughtError::Exception(exception) => {
            let object = exception.as_object();
            ScriptFailure {
                name: object.get::<_, Option<String>>("name").ok().flatten(),
                message: exception.message().unwrap_or_default(),
                raised_by_host: object
                    .get::<_, Option<bool>>(HOST_ERROR_TAG)
                    .ok()
                    .flatten()
                    .unwrap_or(false),
            }
        }
        CaughtError::Value(value) => ScriptFailure {
            name: None,
            message: render(ctx, &value).unwrap_or_else(|| "undefined".to_string()),
            raised_by_host: false,
        },
        CaughtError::Error(err) => ScriptFailure {
            name: None,
            message: err.to_string(),
            raised_by_host: false,
        },
    }
}

/// Install every available capability on the global object.
fn register(ctx: &Ctx<'_>, bridge: &Bridge) -> rquickjs::Result<()> {
    let globals = ctx.globals();

    let b = bridge.clone();
    globals.set(
        Capability::Call.name(),
        Function::new(ctx.clone(), move |ctx: Ctx<'_>, text: Coerced<String>| {
            b.invoke(&ctx, |host, cx| host.call(cx, &text.0))
        })?,
    )?;

    let b = bridge.clone();
    globals.set(
        Capability::Shell.name(),
        Function::new(ctx.clone(), move |ctx: Ctx<'_>, text: Coerced<String>| {
            b.invoke(&ctx, |host, cx| host.shell(cx, &text.0))
        })?,
    )?;

    let b = bridge.clone();
    globals.set(
        Capability::CallCompare.name(),
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'_>, text: Coerced<String>, expected: Coerced<String>| {
                b.invoke(&ctx, |host, cx| host.call_compare(cx, &text.0, &expected.0))
            },
        )?,
    )?;

    let b = bridge.clone();
    globals.set(
        Capability::CallContains.name(),
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'_>, text: Coerced<String>, expected: Coerced<String>| {
                b.invoke(&ctx, |host, cx| host.call_contains(cx, &text.0, &expected.0))
            },
        )?,
    )?;

    let b = bridge.clone();
    globals.set(
        Capability::PrintToConsole.name(),
        Function::new(ctx.clone(), move |ctx: Ctx<'_>, text: Coerced<String>| {
            b.invoke(&ctx, |host, cx| host.print_to_console(cx, &text.0))
                .map(|()| true)
        })?,
    )?;

    let b = bridge.clone();
    globals.set(
        Capability::PrintToLog.name(),
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'_>, text: Coerced<String>, level: Coerced<String>| {
                b.invoke(&ctx, |host, cx| host.print_to_log(cx, &text.0, &level.0))
                    .map(|()| true)
            },
        )?,
    )?;

    if !platform::SUPPORTS_SETTINGS {
        return Ok(());
    }

    let b = bridge.clone();
    globals.set(
        Capability::QueryPlatformSetting.name(),
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'_>,
                  scope: Coerced<String>,
                  path: Coerced<String>,
                  value: Coerced<String>| {
                b.invoke(&ctx, |host, cx| {
                    host.query_platform_setting(cx, &scope.0, &path.0, &value.0)
                })
            },
        )?,
    )?;

    let b = bridge.clone();
    globals.set(
        Capability::RegQuery.name(),
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'_>, full_path: Coerced<String>, value: Coerced<String>| {
                let (scope, path) = platform::split_full_path(&full_path.0);
                b.invoke(&ctx, |host, cx| {
                    host.query_platform_setting(cx, scope.hive(), path, &value.0)
                })
            },
        )?,
    )?;

    Ok(())
}

impl From<SandboxError> for AuditError {
    fn from(err: SandboxError) -> Self {
        Self::new(ErrorCode::ScriptError, err.to_string())
    }
}
