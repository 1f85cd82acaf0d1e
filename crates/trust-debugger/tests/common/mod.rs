//! Shared helpers: a scripted backend and an in-memory debuggee model.
#![allow(dead_code, unused_imports)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use smol_str::SmolStr;

use trust_debugger::value::{
    escape_string, ChildRange, EvaluationContext, EvaluationOptions, Literal,
    NameResolvingEvaluator, ObjectPath, ObjectValue, ObjectValueAdapter, ObjectValueSource,
    TargetType, TargetValue, TypeResolver, ValueFlags, ValueRef, ValueReference,
    ValueReferenceExt, ValueSource,
};
use trust_debugger::{
    AssemblyLine, BackendError, BackendHandle, BackendResult, Backtrace, BreakEvent,
    BreakEventBinding, DebuggerBackend, DebuggerSession, DebuggerSessionOptions, EvalError,
    EvalResult, HitAction, OutputWriter, ProcessInfo, SessionConfig, SessionFrontend,
    SourceLocation, StartInfo, TargetEvent, TargetEventKind, ThreadInfo,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_test_writer()
        .try_init();
}

/// Backend that records every call and fails on request.
#[derive(Default)]
pub struct ScriptedBackend {
    frontend: Mutex<Option<SessionFrontend>>,
    calls: Mutex<Vec<String>>,
    failures: Mutex<HashMap<&'static str, String>>,
    unbindable_files: Mutex<HashSet<String>>,
    bound: Mutex<HashMap<BackendHandle, String>>,
    next_handle: AtomicU64,
    command_delay: Mutex<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    refuse_changes: AtomicBool,
    resolve_calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make `command` fail with `message` until cleared.
    pub fn fail(&self, command: &'static str, message: &str) {
        self.failures.lock().insert(command, message.to_string());
    }

    pub fn clear_failure(&self, command: &'static str) {
        self.failures.lock().remove(command);
    }

    /// Inserts for breakpoints in `file` fail until `allow_file` is called.
    pub fn refuse_file(&self, file: &str) {
        self.unbindable_files.lock().insert(file.to_string());
    }

    pub fn allow_file(&self, file: &str) {
        self.unbindable_files.lock().remove(file);
    }

    pub fn set_command_delay(&self, delay: Duration) {
        *self.command_delay.lock() = delay;
    }

    pub fn refuse_changes(&self, refuse: bool) {
        self.refuse_changes.store(refuse, Ordering::SeqCst);
    }

    pub fn frontend(&self) -> SessionFrontend {
        self.frontend
            .lock()
            .clone()
            .expect("backend is connected to a session")
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn bound_handles(&self) -> usize {
        self.bound.lock().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn resolve_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }

    /// Play the engine's side of hitting the break event bound to `handle`.
    ///
    /// `trace` stands in for the evaluated trace expression.
    pub fn hit(&self, handle: BackendHandle, trace: &str) {
        let frontend = self.frontend();
        let Some(info) = frontend.break_event_for_handle(handle) else {
            return;
        };
        let event = info.break_event;
        if let Some(action) = event.custom_action_id.as_deref() {
            if event.hit_action.contains(HitAction::CUSTOM_ACTION)
                && !frontend.custom_break_event_hit(action, handle)
            {
                return;
            }
        }
        if event.hit_action.contains(HitAction::PRINT_EXPRESSION) {
            frontend.breakpoint_trace(handle, trace);
        }
        if event.hit_action.contains(HitAction::BREAK) {
            let mut stop = TargetEvent::new(TargetEventKind::TargetHitBreakpoint);
            stop.break_event = Some(event.id());
            frontend.notify_target_event(stop);
        }
    }

    fn command(&self, name: &'static str) -> BackendResult<()> {
        let active = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(active, Ordering::SeqCst);
        let delay = *self.command_delay.lock();
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        self.calls.lock().push(name.to_string());
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        match self.failures.lock().get(name) {
            Some(message) => Err(BackendError::failed(message.clone())),
            None => Ok(()),
        }
    }
}

impl DebuggerBackend for ScriptedBackend {
    fn connect(&self, frontend: SessionFrontend) {
        *self.frontend.lock() = Some(frontend);
    }

    fn on_run(&self, _start: &StartInfo, _options: &DebuggerSessionOptions) -> BackendResult<()> {
        self.command("run")
    }

    fn on_attach_to_process(
        &self,
        _process_id: u64,
        _options: &DebuggerSessionOptions,
    ) -> BackendResult<()> {
        self.command("attach")
    }

    fn on_detach(&self) -> BackendResult<()> {
        self.command("detach")
    }

    fn on_set_active_thread(&self, _process_id: u64, _thread_id: u64) -> BackendResult<()> {
        self.command("set_active_thread")
    }

    fn on_stop(&self) -> BackendResult<()> {
        self.command("stop")
    }

    fn on_exit(&self) -> BackendResult<()> {
        self.command("exit")
    }

    fn on_step_line(&self) -> BackendResult<()> {
        self.command("step_line")
    }

    fn on_next_line(&self) -> BackendResult<()> {
        self.command("next_line")
    }

    fn on_step_instruction(&self) -> BackendResult<()> {
        self.command("step_instruction")
    }

    fn on_next_instruction(&self) -> BackendResult<()> {
        self.command("next_instruction")
    }

    fn on_finish(&self) -> BackendResult<()> {
        self.command("finish")
    }

    fn on_continue(&self) -> BackendResult<()> {
        self.command("continue")
    }

    fn insert_break_event(&self, break_event: &BreakEvent) -> BackendResult<BreakEventBinding> {
        self.calls.lock().push(format!("insert {break_event}"));
        if let Some(file) = break_event.file() {
            if self.unbindable_files.lock().contains(file) {
                return Err(BackendError::failed("No source file loaded for this location"));
            }
        }
        let handle = BackendHandle(self.next_handle.fetch_add(1, Ordering::SeqCst) + 1);
        self.bound.lock().insert(handle, break_event.to_string());
        Ok(BreakEventBinding::bound(handle))
    }

    fn remove_break_event(&self, handle: BackendHandle) -> BackendResult<()> {
        self.calls.lock().push(format!("remove {handle}"));
        self.bound
            .lock()
            .remove(&handle)
            .map(|_| ())
            .ok_or(BackendError::UnknownHandle(handle.0))
    }

    fn update_break_event(&self, handle: BackendHandle, break_event: &BreakEvent) -> BackendResult<()> {
        self.calls.lock().push(format!("update {handle} {break_event}"));
        Ok(())
    }

    fn enable_break_event(&self, handle: BackendHandle, enable: bool) -> BackendResult<()> {
        self.calls.lock().push(format!("enable {handle} {enable}"));
        Ok(())
    }

    fn allow_break_event_changes(&self) -> bool {
        !self.refuse_changes.load(Ordering::SeqCst)
    }

    fn get_threads(&self, process_id: u64) -> BackendResult<Vec<ThreadInfo>> {
        Ok(vec![
            ThreadInfo::new(process_id, 1, "main"),
            ThreadInfo::new(process_id, 2, "worker"),
        ])
    }

    fn get_processes(&self) -> BackendResult<Vec<ProcessInfo>> {
        self.calls.lock().push("get_processes".to_string());
        Ok(vec![ProcessInfo::new(4242, "app")])
    }

    fn get_backtrace(&self, _process_id: u64, _thread_id: u64) -> BackendResult<Option<Backtrace>> {
        Ok(None)
    }

    fn disassemble_file(&self, file: &str) -> BackendResult<Option<Vec<AssemblyLine>>> {
        Err(BackendError::failed(format!("cannot disassemble {file}")))
    }

    fn resolve_expression(
        &self,
        expression: &str,
        location: &SourceLocation,
        types: &TypeResolver,
    ) -> BackendResult<Option<String>> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        if expression.contains('@') {
            return Err(BackendError::failed("unexpected character '@'"));
        }
        Ok(Some(trust_debugger::value::resolve_type_names(
            expression, location, types,
        )))
    }
}

pub fn inline_session(backend: &Arc<ScriptedBackend>) -> DebuggerSession {
    DebuggerSession::with_config(backend.clone(), SessionConfig::inline())
        .expect("inline session")
}

pub fn worker_session(backend: &Arc<ScriptedBackend>) -> DebuggerSession {
    DebuggerSession::with_config(backend.clone(), SessionConfig::default())
        .expect("worker session")
}

/// Collects `(is_stderr, text)` pairs written to a sink.
pub fn capture() -> (OutputWriter, Arc<Mutex<Vec<(bool, String)>>>) {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&lines);
    let writer: OutputWriter = Arc::new(move |is_stderr: bool, text: &str| {
        sink.lock().push((is_stderr, text.to_string()));
    });
    (writer, lines)
}

/// Start the session's target and report it ready.
pub fn start(session: &DebuggerSession, backend: &ScriptedBackend) {
    session
        .run(StartInfo::new("/bin/app"), DebuggerSessionOptions::default())
        .expect("run accepted");
    assert!(session.wait_for_commands(Duration::from_secs(5)));
    backend.frontend().notify_started(None);
}

// In-memory debuggee.

pub type Slot = Arc<Mutex<FakeValue>>;

#[derive(Debug, Clone)]
pub enum FakeValue {
    Null(&'static str),
    Int(i64),
    Text(String),
    Array(Vec<i64>),
    Object {
        type_name: &'static str,
        fields: Vec<(SmolStr, Slot)>,
    },
}

impl FakeValue {
    pub fn slot(self) -> Slot {
        Arc::new(Mutex::new(self))
    }

    pub fn object(type_name: &'static str, fields: Vec<(&str, FakeValue)>) -> Self {
        Self::Object {
            type_name,
            fields: fields
                .into_iter()
                .map(|(name, value)| (SmolStr::new(name), value.slot()))
                .collect(),
        }
    }

    fn type_name(&self) -> String {
        match self {
            Self::Null(type_name) => (*type_name).to_string(),
            Self::Int(_) => "int".to_string(),
            Self::Text(_) => "string".to_string(),
            Self::Array(_) => "int[]".to_string(),
            Self::Object { type_name, .. } => (*type_name).to_string(),
        }
    }
}

/// Scope handed to the adapter through `EvaluationContext::scope`.
#[derive(Default)]
pub struct FakeFrame {
    pub locals: Vec<(SmolStr, Slot)>,
    pub parameters: Vec<(SmolStr, Slot)>,
    pub this: Option<Slot>,
}

impl FakeFrame {
    pub fn local(mut self, name: &str, value: FakeValue) -> Self {
        self.locals.push((SmolStr::new(name), value.slot()));
        self
    }

    pub fn parameter(mut self, name: &str, value: FakeValue) -> Self {
        self.parameters.push((SmolStr::new(name), value.slot()));
        self
    }

    pub fn receiver(mut self, value: FakeValue) -> Self {
        self.this = Some(value.slot());
        self
    }
}

fn fake(value: &TargetValue) -> EvalResult<&FakeValue> {
    value
        .downcast_ref::<FakeValue>()
        .ok_or_else(|| EvalError::Internal("foreign target value".to_string()))
}

fn frame(ctx: &EvaluationContext) -> EvalResult<&FakeFrame> {
    ctx.scope
        .downcast_ref::<FakeFrame>()
        .ok_or_else(|| EvalError::Internal("foreign scope".to_string()))
}

/// Named slot in the fake debuggee.
pub struct SlotReference {
    ctx: EvaluationContext,
    name: SmolStr,
    slot: Slot,
    flags: ValueFlags,
}

impl SlotReference {
    pub fn new(ctx: &EvaluationContext, name: &str, slot: &Slot, flags: ValueFlags) -> ValueRef {
        Arc::new(Self {
            ctx: ctx.clone(),
            name: SmolStr::new(name),
            slot: Arc::clone(slot),
            flags,
        })
    }
}

impl ValueReference for SlotReference {
    fn context(&self) -> &EvaluationContext {
        &self.ctx
    }

    fn name(&self) -> SmolStr {
        self.name.clone()
    }

    fn value_type(&self) -> EvalResult<TargetType> {
        Ok(TargetType::new(self.slot.lock().type_name()))
    }

    fn value(&self) -> EvalResult<TargetValue> {
        Ok(TargetValue::new(self.slot.lock().clone()))
    }

    fn set_value(&self, value: TargetValue) -> EvalResult<()> {
        *self.slot.lock() = fake(&value)?.clone();
        Ok(())
    }

    fn flags(&self) -> ValueFlags {
        self.flags
    }
}

/// Adapter over [`FakeValue`] that records child fetches.
#[derive(Default)]
pub struct FakeAdapter {
    pub fetches: Mutex<Vec<ChildRange>>,
    pub fail_children: AtomicBool,
    pub invoke_waits: AtomicUsize,
    delay: Mutex<Duration>,
    child_timeout: Mutex<Option<Duration>>,
}

impl FakeAdapter {
    pub fn fetches(&self) -> Vec<ChildRange> {
        self.fetches.lock().clone()
    }

    /// Slow down node creation and child fetches by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn set_child_timeout(&self, timeout: Duration) {
        *self.child_timeout.lock() = Some(timeout);
    }

    fn stall(&self) {
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }
}

impl ObjectValueAdapter for FakeAdapter {
    fn is_null(&self, _ctx: &EvaluationContext, value: &TargetValue) -> bool {
        matches!(value.downcast_ref::<FakeValue>(), Some(FakeValue::Null(_)))
    }

    fn is_primitive(&self, _ctx: &EvaluationContext, value: &TargetValue) -> bool {
        matches!(
            value.downcast_ref::<FakeValue>(),
            Some(FakeValue::Int(_) | FakeValue::Text(_))
        )
    }

    fn is_array(&self, _ctx: &EvaluationContext, value: &TargetValue) -> bool {
        matches!(value.downcast_ref::<FakeValue>(), Some(FakeValue::Array(_)))
    }

    fn is_class_instance(&self, _ctx: &EvaluationContext, value: &TargetValue) -> bool {
        matches!(value.downcast_ref::<FakeValue>(), Some(FakeValue::Object { .. }))
    }

    fn value_type(&self, _ctx: &EvaluationContext, value: &TargetValue) -> EvalResult<TargetType> {
        Ok(TargetType::new(fake(value)?.type_name()))
    }

    fn type_name(&self, _ctx: &EvaluationContext, ty: &TargetType) -> String {
        ty.downcast_ref::<String>().cloned().unwrap_or_default()
    }

    fn local_variables(&self, ctx: &EvaluationContext) -> EvalResult<Vec<ValueRef>> {
        Ok(frame(ctx)?
            .locals
            .iter()
            .map(|(name, slot)| SlotReference::new(ctx, name, slot, ValueFlags::VARIABLE))
            .collect())
    }

    fn parameters(&self, ctx: &EvaluationContext) -> EvalResult<Vec<ValueRef>> {
        Ok(frame(ctx)?
            .parameters
            .iter()
            .map(|(name, slot)| SlotReference::new(ctx, name, slot, ValueFlags::PARAMETER))
            .collect())
    }

    fn this_reference(&self, ctx: &EvaluationContext) -> EvalResult<Option<ValueRef>> {
        Ok(frame(ctx)?.this.as_ref().map(|slot| {
            SlotReference::new(ctx, "this", slot, ValueFlags::VARIABLE | ValueFlags::READ_ONLY)
        }))
    }

    fn members(
        &self,
        ctx: &EvaluationContext,
        _ty: &TargetType,
        object: &TargetValue,
    ) -> EvalResult<Vec<ValueRef>> {
        match fake(object)? {
            FakeValue::Object { fields, .. } => Ok(fields
                .iter()
                .map(|(name, slot)| SlotReference::new(ctx, name, slot, ValueFlags::FIELD))
                .collect()),
            _ => Ok(Vec::new()),
        }
    }

    fn array_element(
        &self,
        ctx: &EvaluationContext,
        array: &TargetValue,
        indices: &[usize],
    ) -> EvalResult<ValueRef> {
        let FakeValue::Array(items) = fake(array)? else {
            return Err(EvalError::evaluation("not an array"));
        };
        let [index] = indices else {
            return Err(EvalError::evaluation("wrong number of indices"));
        };
        let item = items
            .get(*index)
            .ok_or_else(|| EvalError::evaluation("Index out of range"))?;
        Ok(SlotReference::new(
            ctx,
            &format!("[{index}]"),
            &FakeValue::Int(*item).slot(),
            ValueFlags::ARRAY_ELEMENT | ValueFlags::READ_ONLY,
        ))
    }

    fn cast(
        &self,
        _ctx: &EvaluationContext,
        value: &TargetValue,
        ty: &TargetType,
    ) -> EvalResult<TargetValue> {
        let wanted = ty.downcast_ref::<String>().cloned().unwrap_or_default();
        let actual = fake(value)?.type_name();
        if wanted == actual {
            return Ok(value.clone());
        }
        Err(EvalError::evaluation(format!(
            "Cannot convert '{actual}' to '{wanted}'"
        )))
    }

    fn to_literal(&self, _ctx: &EvaluationContext, value: &TargetValue) -> EvalResult<Literal> {
        Ok(match fake(value)? {
            FakeValue::Null(_) => Literal::Null,
            FakeValue::Int(value) => Literal::Int(*value),
            FakeValue::Text(text) => Literal::String(text.clone()),
            other => Literal::Other(other.type_name()),
        })
    }

    fn create_literal(&self, _ctx: &EvaluationContext, literal: &Literal) -> EvalResult<TargetValue> {
        let value = match literal {
            Literal::Null => FakeValue::Null("object"),
            Literal::Int(value) => FakeValue::Int(*value),
            Literal::String(text) => FakeValue::Text(text.clone()),
            _ => return Err(EvalError::not_supported()),
        };
        Ok(TargetValue::new(value))
    }

    fn create_object_value(
        &self,
        _ctx: &EvaluationContext,
        source: Arc<dyn ObjectValueSource>,
        path: ObjectPath,
        value: &TargetValue,
        flags: ValueFlags,
    ) -> EvalResult<ObjectValue> {
        self.stall();
        let editable = !flags.is_read_only();
        Ok(match fake(value)? {
            FakeValue::Null(type_name) => ObjectValue::null_object(path.last(), type_name),
            FakeValue::Int(value) => {
                ObjectValue::primitive(Some(source), path, "int", value.to_string(), editable)
            }
            FakeValue::Text(text) => ObjectValue::primitive(
                Some(source),
                path,
                "string",
                format!("\"{}\"", escape_string(text)),
                editable,
            ),
            FakeValue::Array(items) => {
                ObjectValue::array(Some(source), path, "int[]", items.len(), None)
            }
            FakeValue::Object { type_name, .. } => {
                ObjectValue::object(Some(source), path, type_name, format!("{{{type_name}}}"), None)
            }
        })
    }

    fn object_value_children(
        &self,
        ctx: &EvaluationContext,
        path: &ObjectPath,
        object: &TargetValue,
        range: ChildRange,
    ) -> EvalResult<Vec<ObjectValue>> {
        self.fetches.lock().push(range);
        self.stall();
        if self.fail_children.load(Ordering::SeqCst) {
            return Err(EvalError::evaluation("Target is busy"));
        }
        match fake(object)? {
            FakeValue::Array(items) => {
                let (start, count) = match range {
                    ChildRange::All => (0, items.len()),
                    ChildRange::Range { start, count } => (start, count),
                };
                Ok(items
                    .iter()
                    .enumerate()
                    .skip(start)
                    .take(count)
                    .map(|(index, item)| {
                        ObjectValue::primitive(
                            None,
                            path.append(format!("[{index}]")),
                            "int",
                            item.to_string(),
                            false,
                        )
                    })
                    .collect())
            }
            FakeValue::Object { fields, .. } => Ok(fields
                .iter()
                .map(|(name, slot)| {
                    SlotReference::new(ctx, name, slot, ValueFlags::FIELD).object_value()
                })
                .collect()),
            _ => Ok(Vec::new()),
        }
    }

    fn call_to_string(&self, _ctx: &EvaluationContext, value: &TargetValue) -> EvalResult<String> {
        Ok(match fake(value)? {
            FakeValue::Null(_) => String::new(),
            FakeValue::Int(value) => value.to_string(),
            FakeValue::Text(text) => text.clone(),
            other => other.type_name(),
        })
    }

    fn default_child_evaluation_timeout(&self) -> Duration {
        self.child_timeout
            .lock()
            .unwrap_or(trust_debugger::config::DEFAULT_CHILD_TIMEOUT)
    }

    fn wait_runtime_invokes(&self) {
        self.invoke_waits.fetch_add(1, Ordering::SeqCst);
    }
}

/// Context over `frame` using the default evaluator.
pub fn eval_context(adapter: &Arc<FakeAdapter>, frame: FakeFrame) -> EvaluationContext {
    EvaluationContext::new(
        adapter.clone(),
        Arc::new(NameResolvingEvaluator),
        TargetValue::new(frame),
        EvaluationOptions::default(),
    )
}
