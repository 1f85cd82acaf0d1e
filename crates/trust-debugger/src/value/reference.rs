//! Live handles into debuggee state.
//! - ValueReference: name/type/value accessors bound to a context
//! - ValueReferenceExt: tree materialization and navigation helpers
//! - ValueSource: adapts a reference to the value tree's child-source contract

use std::ops::BitOr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use smol_str::SmolStr;
use tracing::{debug, warn};

use crate::error::{EvalError, EvalResult};

use super::adapter::{Literal, TargetType, TargetValue};
use super::context::{EvaluationContext, EvaluationOptions};
use super::object::{ChildRange, ObjectPath, ObjectValue, ObjectValueSource};

/// Mutability and origin of a value reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ValueFlags(u16);

impl ValueFlags {
    pub const NONE: Self = Self(0);
    pub const READ_ONLY: Self = Self(1);
    pub const FIELD: Self = Self(1 << 1);
    pub const PROPERTY: Self = Self(1 << 2);
    pub const VARIABLE: Self = Self(1 << 3);
    pub const PARAMETER: Self = Self(1 << 4);
    pub const LITERAL: Self = Self(1 << 5);
    pub const ARRAY_ELEMENT: Self = Self(1 << 6);

    #[must_use]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub fn is_read_only(self) -> bool {
        self.contains(Self::READ_ONLY)
    }
}

impl BitOr for ValueFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// A live handle into backend state.
///
/// The handle owns nothing itself; the context keeps backend resources alive.
pub trait ValueReference: Send + Sync {
    fn context(&self) -> &EvaluationContext;

    fn name(&self) -> SmolStr;

    fn value_type(&self) -> EvalResult<TargetType>;

    fn value(&self) -> EvalResult<TargetValue>;

    fn set_value(&self, value: TargetValue) -> EvalResult<()>;

    fn flags(&self) -> ValueFlags;
}

pub type ValueRef = Arc<dyn ValueReference>;

/// A non-null value as seen by evaluators.
#[derive(Debug, Clone)]
pub enum PlainValue {
    /// Primitive converted through the adapter.
    Primitive(Literal),
    Object(TargetValue),
}

/// Tree helpers for shared value references.
pub trait ValueReferenceExt {
    /// Never fails: evaluation problems become error, unsupported or unknown nodes.
    fn object_value(&self) -> ObjectValue;

    /// `None` for null; primitives come back converted to literals.
    fn plain_value(&self) -> EvalResult<Option<PlainValue>>;

    fn children(&self, path: &ObjectPath, range: ChildRange) -> EvalResult<Vec<ObjectValue>>;

    /// Members of a class instance; empty for anything else or on failure.
    fn child_references(&self) -> Vec<ValueRef>;

    /// Member by name, or element by `[i,j]` index syntax on arrays.
    fn child(&self, name: &str) -> EvalResult<Option<ValueRef>>;

    fn child_at_path(&self, path: &[SmolStr]) -> EvalResult<Option<ValueRef>>;

    /// The value's `ToString()`, or `{TypeName}` when such calls are disabled.
    fn call_to_string(&self) -> EvalResult<String>;
}

impl ValueReferenceExt for ValueRef {
    fn object_value(&self) -> ObjectValue {
        let ctx = self.context();
        let name = self.name();
        let name = if name.is_empty() { SmolStr::new("?") } else { name };
        let reference = Arc::clone(self);
        let job_name = name.clone();
        match run_with_timeout(ctx.timeout, move || describe(&reference, &job_name)) {
            Timed::Done(value) => value,
            Timed::Pending(result) => {
                debug!(%name, timeout = ?ctx.timeout, "evaluation still running");
                ObjectValue::evaluating(&name, result)
            }
            Timed::Lost => {
                ctx.write_debugger_error(&EvalError::Internal(format!(
                    "evaluation of '{name}' panicked"
                )));
                ObjectValue::unknown(&name)
            }
        }
    }

    fn plain_value(&self) -> EvalResult<Option<PlainValue>> {
        let ctx = self.context();
        let value = self.value()?;
        if ctx.adapter.is_null(ctx, &value) {
            return Ok(None);
        }
        if ctx.adapter.is_primitive(ctx, &value) {
            let literal = ctx.adapter.to_literal(ctx, &value)?;
            return Ok(Some(PlainValue::Primitive(literal)));
        }
        Ok(Some(PlainValue::Object(value)))
    }

    fn children(&self, path: &ObjectPath, range: ChildRange) -> EvalResult<Vec<ObjectValue>> {
        let ctx = self.context().child_context();
        let timeout = ctx.timeout;
        let reference = Arc::clone(self);
        let path = path.clone();
        let fetch = move || -> EvalResult<Vec<ObjectValue>> {
            let value = reference.value()?;
            ctx.adapter.object_value_children(&ctx, &path, &value, range)
        };
        match run_with_timeout(timeout, fetch) {
            Timed::Done(children) => children,
            Timed::Pending(_) => Err(EvalError::evaluation("Timeout when getting children")),
            Timed::Lost => Err(EvalError::Internal("child enumeration panicked".to_string())),
        }
    }

    fn child_references(&self) -> Vec<ValueRef> {
        let ctx = self.context();
        let members = || -> EvalResult<Vec<ValueRef>> {
            let value = self.value()?;
            if !ctx.adapter.is_class_instance(ctx, &value) {
                return Ok(Vec::new());
            }
            let ty = ctx.adapter.value_type(ctx, &value)?;
            ctx.adapter.members(&ctx.child_context(), &ty, &value)
        };
        members().unwrap_or_else(|err| {
            debug!(%err, "child enumeration failed");
            Vec::new()
        })
    }

    fn child(&self, name: &str) -> EvalResult<Option<ValueRef>> {
        let ctx = self.context();
        let value = self.value()?;
        if ctx.adapter.is_null(ctx, &value) {
            return Ok(None);
        }
        if ctx.adapter.is_array(ctx, &value) {
            let indices = parse_indices(name)?;
            return ctx.adapter.array_element(ctx, &value, &indices).map(Some);
        }
        if ctx.adapter.is_class_instance(ctx, &value) {
            let ty = ctx.adapter.value_type(ctx, &value)?;
            return ctx.adapter.member(&ctx.child_context(), &ty, &value, name);
        }
        Ok(None)
    }

    fn child_at_path(&self, path: &[SmolStr]) -> EvalResult<Option<ValueRef>> {
        let Some((first, rest)) = path.split_first() else {
            return Ok(Some(Arc::clone(self)));
        };
        match self.child(first)? {
            Some(child) => child.child_at_path(rest),
            None => Ok(None),
        }
    }

    fn call_to_string(&self) -> EvalResult<String> {
        let ctx = self.context();
        let value = self.value()?;
        if !ctx.options.allow_to_string_calls {
            let ty = ctx.adapter.value_type(ctx, &value)?;
            return Ok(format!("{{{}}}", ctx.adapter.type_name(ctx, &ty)));
        }
        ctx.adapter.call_to_string(ctx, &value)
    }
}

/// Outcome of a job raced against a timeout.
enum Timed<T> {
    Done(T),
    /// Still running; the receiver yields the result once it is ready.
    Pending(Receiver<T>),
    /// The job panicked.
    Lost,
}

/// Run `job` on a helper thread and wait up to `timeout` for it.
///
/// A zero timeout, or a failed spawn, runs the job on the calling thread.
fn run_with_timeout<T, F>(timeout: Duration, job: F) -> Timed<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    if timeout.is_zero() {
        return Timed::Done(job());
    }
    let (sender, receiver) = crossbeam_channel::bounded(1);
    let job = Arc::new(Mutex::new(Some(job)));
    let remote = Arc::clone(&job);
    let spawned = thread::Builder::new()
        .name("trust-debugger-eval".to_string())
        .spawn(move || {
            let job = remote.lock().take();
            if let Some(job) = job {
                let _ = sender.send(job());
            }
        });
    if let Err(err) = spawned {
        warn!(%err, "failed to spawn evaluation thread; evaluating inline");
        let job = job.lock().take();
        return job.map_or(Timed::Lost, |job| Timed::Done(job()));
    }
    match receiver.recv_timeout(timeout) {
        Ok(value) => Timed::Done(value),
        Err(RecvTimeoutError::Timeout) => Timed::Pending(receiver),
        Err(RecvTimeoutError::Disconnected) => Timed::Lost,
    }
}

/// Build the node for `reference`, turning failures into typed leaves.
fn describe(reference: &ValueRef, name: &str) -> ObjectValue {
    match create_object_value(reference, name) {
        Ok(value) => value,
        Err(EvalError::NotSupported(message)) => ObjectValue::not_supported(name, message),
        Err(err @ (EvalError::Evaluation(_) | EvalError::UnresolvedName(_))) => {
            ObjectValue::error(name, err.to_string())
        }
        Err(err) => {
            reference.context().write_debugger_error(&err);
            ObjectValue::unknown(name)
        }
    }
}

fn create_object_value(reference: &ValueRef, name: &str) -> EvalResult<ObjectValue> {
    let ctx = reference.context();
    let value = reference.value()?;
    if ctx.adapter.is_null(ctx, &value) {
        let ty = reference.value_type()?;
        return Ok(ObjectValue::null_object(name, &ctx.adapter.type_name(ctx, &ty)));
    }
    let source: Arc<dyn ObjectValueSource> = Arc::new(ValueSource::new(Arc::clone(reference)));
    let node = ctx.adapter.create_object_value(
        ctx,
        source,
        ObjectPath::new(name),
        &value,
        reference.flags(),
    )?;
    Ok(if node.is_array() {
        node.with_fetch_chunk(ctx.options.array_fetch_chunk)
    } else {
        node
    })
}

/// `[1]` or `[2,3]` to element indices.
fn parse_indices(name: &str) -> EvalResult<Vec<usize>> {
    let inner = name
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(|| EvalError::evaluation(format!("Invalid array index '{name}'")))?;
    inner
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<usize>()
                .map_err(|_| EvalError::evaluation(format!("Invalid array index '{name}'")))
        })
        .collect()
}

/// Child source backed by a value reference.
pub struct ValueSource {
    reference: ValueRef,
}

impl ValueSource {
    #[must_use]
    pub fn new(reference: ValueRef) -> Self {
        Self { reference }
    }

    fn assign(&self, text: &str) -> EvalResult<()> {
        let ctx = self.reference.context();
        ctx.adapter.wait_runtime_invokes();
        let ty = self.reference.value_type()?;
        let options = EvaluationOptions {
            expected_type: Some(ty.clone()),
            allow_method_evaluation: true,
            ..ctx.options.clone()
        };
        let evaluated = ctx.evaluator.evaluate(ctx, text, &options)?;
        let value = ctx.adapter.cast(ctx, &evaluated.value()?, &ty)?;
        self.reference.set_value(value)
    }

    fn canonical_text(&self) -> EvalResult<String> {
        let ctx = self.reference.context();
        let value = self.reference.value()?;
        ctx.evaluator.to_expression(ctx, &value)
    }
}

impl ObjectValueSource for ValueSource {
    fn children(&self, path: &ObjectPath, range: ChildRange) -> EvalResult<Vec<ObjectValue>> {
        self.reference.children(path, range)
    }

    fn set_value(&self, _path: &ObjectPath, value: &str) -> EvalResult<String> {
        let ctx = self.reference.context();
        if let Err(err) = self.assign(value) {
            ctx.write_debugger_output(&format!("Value assignment failed: {err}\n"));
        }
        match self.canonical_text() {
            Ok(text) => Ok(text),
            Err(err) => {
                ctx.write_debugger_output(&format!("Value assignment failed: {err}\n"));
                Ok(value.to_string())
            }
        }
    }
}

/// Value produced by evaluating a literal expression.
pub struct LiteralValueReference {
    ctx: EvaluationContext,
    name: SmolStr,
    value: TargetValue,
}

impl LiteralValueReference {
    #[must_use]
    pub fn new(ctx: EvaluationContext, name: impl Into<SmolStr>, value: TargetValue) -> Self {
        Self {
            ctx,
            name: name.into(),
            value,
        }
    }
}

impl ValueReference for LiteralValueReference {
    fn context(&self) -> &EvaluationContext {
        &self.ctx
    }

    fn name(&self) -> SmolStr {
        self.name.clone()
    }

    fn value_type(&self) -> EvalResult<TargetType> {
        self.ctx.adapter.value_type(&self.ctx, &self.value)
    }

    fn value(&self) -> EvalResult<TargetValue> {
        Ok(self.value.clone())
    }

    fn set_value(&self, _value: TargetValue) -> EvalResult<()> {
        Err(EvalError::evaluation("Literal values cannot be assigned"))
    }

    fn flags(&self) -> ValueFlags {
        ValueFlags::LITERAL | ValueFlags::READ_ONLY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_combine() {
        let flags = ValueFlags::FIELD | ValueFlags::READ_ONLY;
        assert!(flags.contains(ValueFlags::FIELD));
        assert!(flags.is_read_only());
        assert!(!ValueFlags::VARIABLE.is_read_only());
    }

    #[test]
    fn index_syntax() {
        assert_eq!(parse_indices("[3]").unwrap(), vec![3]);
        assert_eq!(parse_indices("[1, 2]").unwrap(), vec![1, 2]);
        assert!(parse_indices("3").is_err());
        assert!(parse_indices("[-1]").is_err());
    }

    #[test]
    fn zero_timeout_runs_on_the_calling_thread() {
        let caller = thread::current().id();
        let Timed::Done(ran_on) = run_with_timeout(Duration::ZERO, move || thread::current().id())
        else {
            panic!("zero timeout must finish inline");
        };
        assert_eq!(ran_on, caller);
    }

    #[test]
    fn slow_job_is_handed_back_pending() {
        let Timed::Pending(result) = run_with_timeout(Duration::from_millis(10), || {
            thread::sleep(Duration::from_millis(200));
            7
        }) else {
            panic!("job should outlive its timeout");
        };
        assert_eq!(result.recv_timeout(Duration::from_secs(5)).unwrap(), 7);
    }

    #[test]
    fn panicking_job_is_lost() {
        let outcome = run_with_timeout(Duration::from_secs(5), || -> u32 { panic!("boom") });
        assert!(matches!(outcome, Timed::Lost));
    }
}
