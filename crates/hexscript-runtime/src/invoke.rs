//! Invoker & Result Mapper
//!
//! Dispatches a command against a resolved entry point and normalizes what
//! the script returns into an `i32`.

use std::fmt;
use std::path::PathBuf;

use rquickjs::function::This;
use rquickjs::{Ctx, Value};

use crate::command::{Command, CommandKind};
use crate::entry::ScriptEntryPoint;
use crate::error::{ResultCode, ScriptError, ScriptResult};
use crate::modules::describe;

/// CHECK result when the method exists.
pub const METHOD_PRESENT: i32 = 0;
/// CHECK result when the method does not exist.
pub const METHOD_ABSENT: i32 = 1;

// ─────────────────────────────────────────────────────────────────────────────
// Invocation State
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    Parsed,
    ContextOpen,
    DependenciesLoaded,
    ContractValidated,
    EntryResolved,
    Dispatched,
    Closed,
    Done,
    Failed(ResultCode),
}

impl fmt::Display for InvocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(code) => write!(f, "Failed({})", code),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Tracks one invocation through its states.
#[derive(Debug)]
pub struct Invocation {
    kind: CommandKind,
    path: PathBuf,
    state: InvocationState,
}

impl Invocation {
    pub fn new(command: &Command) -> Self {
        tracing::debug!("{} {}: {}", command.kind, command.path.display(), InvocationState::Parsed);
        Self {
            kind: command.kind,
            path: command.path.clone(),
            state: InvocationState::Parsed,
        }
    }

    pub fn state(&self) -> InvocationState {
        self.state
    }

    pub fn advance(&mut self, next: InvocationState) {
        tracing::debug!(
            "{} {}: {} -> {}",
            self.kind,
            self.path.display(),
            self.state,
            next
        );
        self.state = next;
    }

    pub fn fail(&mut self, code: ResultCode) {
        self.advance(InvocationState::Failed(code));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dispatch
// ─────────────────────────────────────────────────────────────────────────────

/// Invoke `method` on the entry unit and map its return value.
pub fn invoke(ctx: &Ctx<'_>, entry: &ScriptEntryPoint<'_>, method: &str) -> ScriptResult<i32> {
    let function = entry
        .method(method)?
        .ok_or_else(|| ScriptError::MethodNotFound(format!("{}.{}", entry.name(), method)))?;

    tracing::debug!("Invoking {}.{}", entry.name(), method);
    let value: Value = function
        .call((This(entry.unit().clone()),))
        .map_err(|err| ScriptError::Execution(describe(ctx, err)))?;

    map_return_value(method, &value)
}

/// Report whether `method` exists without invoking it.
pub fn check(entry: &ScriptEntryPoint<'_>, method: &str) -> ScriptResult<i32> {
    Ok(if entry.has_method(method)? {
        METHOD_PRESENT
    } else {
        METHOD_ABSENT
    })
}

/// Map a script return value to a result.
///
/// `undefined` and `null` mean success. Integral numbers in `i32` range are
/// returned as-is; integral numbers up to `u32::MAX` are reinterpreted as
/// `i32` so scripts can return unsigned codes. Anything else is rejected.
pub fn map_return_value(method: &str, value: &Value<'_>) -> ScriptResult<i32> {
    if value.is_undefined() || value.is_null() {
        return Ok(ResultCode::Success.as_i32());
    }
    if let Some(int) = value.as_int() {
        return Ok(int);
    }
    if let Some(float) = value.as_float() {
        if float.fract() == 0.0 && float >= f64::from(i32::MIN) && float <= f64::from(u32::MAX) {
            return Ok(if float <= f64::from(i32::MAX) {
                float as i32
            } else {
                float as u32 as i32
            });
        }
    }

    Err(ScriptError::ReturnType {
        method: method.to_string(),
        type_name: value.type_name().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoaderConfig;
    use crate::entry;
    use rquickjs::{Context, Module, Runtime};

    fn eval_map(source: &str) -> ScriptResult<i32> {
        let runtime = Runtime::new().unwrap();
        let context = Context::full(&runtime).unwrap();
        context.with(|ctx| {
            let value: Value = ctx.eval(source).unwrap();
            map_return_value("Run", &value)
        })
    }

    fn with_entry<R>(source: &str, f: impl FnOnce(&Ctx<'_>, &ScriptEntryPoint<'_>) -> R) -> R {
        let runtime = Runtime::new().unwrap();
        let context = Context::full(&runtime).unwrap();
        context.with(|ctx| {
            let (module, promise) = Module::declare(ctx.clone(), "script", source)
                .unwrap()
                .eval()
                .unwrap();
            promise.finish::<()>().unwrap();
            let namespace = module.namespace().unwrap();
            let entry = entry::resolve(&namespace, None, &LoaderConfig::default()).unwrap();
            f(&ctx, &entry)
        })
    }

    #[test]
    fn test_map_return_values() {
        assert_eq!(eval_map("undefined").unwrap(), 0);
        assert_eq!(eval_map("null").unwrap(), 0);
        assert_eq!(eval_map("42").unwrap(), 42);
        assert_eq!(eval_map("-5").unwrap(), -5);
        assert_eq!(eval_map("2.0").unwrap(), 2);
        assert_eq!(eval_map("0x10000003").unwrap(), 0x1000_0003);
        assert_eq!(eval_map("0xFFFFFFFF").unwrap(), -1);
        assert_eq!(eval_map("0x80000000").unwrap(), i32::MIN);
    }

    #[test]
    fn test_map_rejects_other_types() {
        for source in ["'text'", "true", "1.5", "({})", "[1]", "0x100000000", "NaN", "-3000000000"] {
            let err = eval_map(source).unwrap_err();
            assert!(matches!(err, ScriptError::ReturnType { .. }), "source: {source}");
            assert_eq!(err.code(), ResultCode::GenericError);
        }
    }

    #[test]
    fn test_invoke_and_check() {
        let source = r#"
            export const Script = {
                IScript: true,
                calls: 0,
                Run() { this.calls += 1; return this.calls; },
                Fail() { throw new Error("bad script"); },
                Text() { return "nope"; },
            };
        "#;
        with_entry(source, |ctx, entry| {
            assert_eq!(check(entry, "Run").unwrap(), METHOD_PRESENT);
            assert_eq!(check(entry, "Missing").unwrap(), METHOD_ABSENT);

            assert_eq!(invoke(ctx, entry, "Run").unwrap(), 1);
            assert_eq!(invoke(ctx, entry, "Run").unwrap(), 2);

            let err = invoke(ctx, entry, "Missing").unwrap_err();
            assert_eq!(err.code(), ResultCode::MethodNotFound);

            match invoke(ctx, entry, "Fail").unwrap_err() {
                ScriptError::Execution(message) => assert!(message.contains("bad script")),
                other => panic!("unexpected error: {other}"),
            }

            let err = invoke(ctx, entry, "Text").unwrap_err();
            assert!(matches!(err, ScriptError::ReturnType { ref type_name, .. } if type_name == "string"));
        });
    }

    #[test]
    fn test_non_function_property_is_not_a_method() {
        with_entry("export const Script = { IScript: true, Run: 5 };", |ctx, entry| {
            assert_eq!(check(entry, "Run").unwrap(), METHOD_ABSENT);
            assert_eq!(invoke(ctx, entry, "Run").unwrap_err().code(), ResultCode::MethodNotFound);
        });
    }

    #[test]
    fn test_invocation_states() {
        let command = Command::parse("EXEC||Run||/s/a.js").unwrap();
        let mut invocation = Invocation::new(&command);
        assert_eq!(invocation.state(), InvocationState::Parsed);
        invocation.advance(InvocationState::ContextOpen);
        invocation.fail(ResultCode::LoaderError);
        assert_eq!(invocation.state(), InvocationState::Failed(ResultCode::LoaderError));
    }
}
