//! Debugger session.
//! - DebuggerSession: lifecycle commands, inspection queries, subscriptions
//! - dispatch: inline or worker execution of command bodies
//! - breakpoints: binding engine over a shared store
//! - frontend: notification handle given to the backend
//! - resolve: expression cache and evaluator lookup

mod breakpoints;
mod dispatch;
mod frontend;
mod resolve;

use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, ReentrantMutex, RwLock};
use tracing::{debug, warn};

use crate::backend::{BackendHandle, DebuggerBackend};
use crate::breakpoints::{
    BindingTable, BreakEvent, BreakEventId, BreakEventInfo, BreakEventStatus, BreakpointStore,
    ListenerId,
};
use crate::config::{DebuggerSessionOptions, SessionConfig};
use crate::error::{SessionError, SessionResult};
use crate::events::{
    EventCallback, EventTopic, Observers, SessionEvent, SubscriptionId, TargetEvent,
    TargetEventKind,
};
use crate::output::{OutputRouter, OutputWriter};
use crate::target::{
    AssemblyLine, Backtrace, ProcessInfo, SourceLocation, StackFrame, StartInfo, ThreadInfo,
};
use crate::value::{EvaluationOptions, ExpressionEvaluator, TypeResolver};

use dispatch::{CommandSpec, Dispatcher, Recovery};
use resolve::{EvaluatorRegistry, ExpressionCache};

pub use frontend::SessionFrontend;
pub use resolve::EvaluatorProvider;

/// Pluggable handler for recovered failures; `true` marks the failure handled.
pub type ExceptionHandler = Arc<dyn Fn(&SessionError) -> bool + Send + Sync>;

/// Receives the evaluated trace text of a tracepoint hit.
pub type BreakpointTraceHandler = Arc<dyn Fn(&BreakEvent, &str) + Send + Sync>;

/// Decides a custom-action hit by action id; `true` stops the target.
pub type BreakEventHitHandler = Arc<dyn Fn(&str, &BreakEvent) -> bool + Send + Sync>;

/// Observable lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    Idle,
    Starting,
    Running,
    Stopped,
    Exited,
    Disposed,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Exited => "exited",
            Self::Disposed => "disposed",
        };
        f.write_str(text)
    }
}

#[derive(Default)]
struct SessionState {
    attached: bool,
    disposed: bool,
    exited: bool,
    active_thread: Option<ThreadInfo>,
    processes: Option<Vec<ProcessInfo>>,
    options: DebuggerSessionOptions,
    store: Option<Arc<BreakpointStore>>,
    owned_store: bool,
    store_subscription: Option<ListenerId>,
}

pub(crate) struct SessionInner {
    backend: Arc<dyn DebuggerBackend>,
    config: SessionConfig,
    /// Serializes commands; re-entrant for backend callbacks on the command thread.
    /// `RefCell` borrows are never held across backend or observer calls.
    state: ReentrantMutex<RefCell<SessionState>>,
    /// Written under `state`, read without it.
    started: AtomicBool,
    running: AtomicBool,
    bindings: BindingTable,
    observers: Observers,
    output: OutputRouter,
    dispatcher: Dispatcher,
    exception_handler: RwLock<Option<ExceptionHandler>>,
    breakpoint_trace_handler: RwLock<Option<BreakpointTraceHandler>>,
    custom_hit_handler: RwLock<Option<BreakEventHitHandler>>,
    type_resolver: RwLock<Option<TypeResolver>>,
    expressions: ExpressionCache,
    evaluators: EvaluatorRegistry,
    faults: Mutex<Vec<SessionError>>,
}

impl SessionInner {
    fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    fn handle_exception(&self, err: &SessionError) -> bool {
        let handler = self.exception_handler.read().clone();
        handler.is_some_and(|handler| handler(err))
    }

    pub(crate) fn breakpoint_trace(&self, handle: BackendHandle, trace: &str) {
        let Some(info) = self.bindings.by_handle(handle) else {
            debug!(%handle, "trace for unknown handle");
            return;
        };
        let handler = self.breakpoint_trace_handler.read().clone();
        match handler {
            Some(handler) => handler(&info.break_event, trace),
            None => self.output.debugger_output(false, &format!("{trace}\n")),
        }
    }

    pub(crate) fn custom_break_event_hit(&self, action_id: &str, handle: BackendHandle) -> bool {
        let Some(info) = self.bindings.by_handle(handle) else {
            debug!(%handle, action_id, "custom hit for unknown handle");
            return true;
        };
        let handler = self.custom_hit_handler.read().clone();
        handler.map_or(true, |handler| handler(action_id, &info.break_event))
    }

    fn link(self: &Arc<Self>) -> SessionLink {
        SessionLink(Arc::downgrade(self))
    }

    /// Apply a backend notification and deliver it, typed first.
    pub(crate) fn on_target_event(self: &Arc<Self>, mut event: TargetEvent) {
        let link = self.link();
        {
            let guard = self.state.lock();
            let mut state = guard.borrow_mut();
            state.processes = None;
            if let Some(process) = event.process.as_mut() {
                process.attach(&link);
            }
            if let Some(thread) = event.thread.as_mut() {
                thread.attach(&link);
                state.active_thread = Some(thread.clone());
            }
            if let Some(backtrace) = event.backtrace.as_mut() {
                backtrace.attach(&link);
            }
            if event.kind.is_stop_class() {
                self.running.store(false, Ordering::SeqCst);
                event.is_stop_event = true;
            } else if event.kind == TargetEventKind::TargetExited {
                self.running.store(false, Ordering::SeqCst);
                self.started.store(false, Ordering::SeqCst);
                state.exited = true;
            }
        }
        debug!(kind = ?event.kind, "target event");
        self.observers.emit_target(event);
    }

    /// Announce readiness, then mark started and bind the store.
    pub(crate) fn on_started(self: &Arc<Self>, thread: Option<ThreadInfo>) {
        let mut ready = TargetEvent::new(TargetEventKind::TargetReady);
        ready.thread = thread;
        self.on_target_event(ready);
        let _guard = self.state.lock();
        self.started.store(true, Ordering::SeqCst);
        self.bind_all();
    }
}

/// Weak back-reference from debuggee objects to their session.
#[derive(Clone, Default)]
pub struct SessionLink(Weak<SessionInner>);

impl SessionLink {
    #[must_use]
    pub fn upgrade(&self) -> Option<DebuggerSession> {
        self.0.upgrade().map(|inner| DebuggerSession { inner })
    }
}

impl fmt::Debug for SessionLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.0.strong_count() > 0 {
            "SessionLink(live)"
        } else {
            "SessionLink(detached)"
        })
    }
}

const RUN: CommandSpec = CommandSpec::resuming("run", Recovery::ForceExit);
const ATTACH: CommandSpec = CommandSpec::resuming("attach", Recovery::ForceExit);
const FINISH: CommandSpec = CommandSpec::resuming("finish", Recovery::ForceExit);
const CONTINUE: CommandSpec = CommandSpec::resuming("continue", Recovery::ForceStop);
const STEP_LINE: CommandSpec = CommandSpec::resuming("step_line", Recovery::ForceStop);
const NEXT_LINE: CommandSpec = CommandSpec::resuming("next_line", Recovery::ForceStop);
const STEP_INSTRUCTION: CommandSpec =
    CommandSpec::resuming("step_instruction", Recovery::ForceStop);
const NEXT_INSTRUCTION: CommandSpec =
    CommandSpec::resuming("next_instruction", Recovery::ForceStop);
const STOP: CommandSpec = CommandSpec::plain("stop");
const EXIT: CommandSpec = CommandSpec::plain("exit");
const DETACH: CommandSpec = CommandSpec::plain("detach");
const DISPOSE: CommandSpec = CommandSpec {
    guard_disposed: false,
    ..CommandSpec::plain("dispose")
};

/// A debugging session over one backend.
///
/// Cheap to clone; clones share the session.
#[derive(Clone)]
pub struct DebuggerSession {
    inner: Arc<SessionInner>,
}

impl DebuggerSession {
    /// Session with the default configuration and `TRUST_DEBUGGER_*` overrides.
    pub fn new(backend: Arc<dyn DebuggerBackend>) -> SessionResult<Self> {
        Self::with_config(backend, SessionConfig::default().with_env_overrides())
    }

    pub fn with_config(
        backend: Arc<dyn DebuggerBackend>,
        config: SessionConfig,
    ) -> SessionResult<Self> {
        let dispatcher = Dispatcher::new(config.dispatch, config.workers)?;
        let state = SessionState {
            options: DebuggerSessionOptions {
                evaluation: config.evaluation.clone(),
                ..DebuggerSessionOptions::default()
            },
            ..SessionState::default()
        };
        let inner = Arc::new(SessionInner {
            backend,
            config,
            state: ReentrantMutex::new(RefCell::new(state)),
            started: AtomicBool::new(false),
            running: AtomicBool::new(false),
            bindings: BindingTable::new(),
            observers: Observers::new(),
            output: OutputRouter::new(),
            dispatcher,
            exception_handler: RwLock::new(None),
            breakpoint_trace_handler: RwLock::new(None),
            custom_hit_handler: RwLock::new(None),
            type_resolver: RwLock::new(None),
            expressions: ExpressionCache::default(),
            evaluators: EvaluatorRegistry::default(),
            faults: Mutex::new(Vec::new()),
        });
        inner
            .backend
            .connect(SessionFrontend::new(Arc::downgrade(&inner)));
        Ok(Self { inner })
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn frontend(&self) -> SessionFrontend {
        SessionFrontend::new(Arc::downgrade(&self.inner))
    }

    // Subscriptions and sinks.

    pub fn subscribe(
        &self,
        topic: EventTopic,
        callback: impl Fn(&SessionEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let callback: EventCallback = Arc::new(callback);
        self.inner.observers.subscribe(topic, callback)
    }

    pub fn subscribe_all(
        &self,
        callback: impl Fn(&SessionEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let callback: EventCallback = Arc::new(callback);
        self.inner.observers.subscribe_all(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.observers.unsubscribe(id)
    }

    pub fn set_output_writer(&self, writer: Option<OutputWriter>) {
        self.inner.output.set_output_writer(writer);
    }

    pub fn set_log_writer(&self, writer: Option<OutputWriter>) {
        self.inner.output.set_log_writer(writer);
    }

    #[must_use]
    pub fn output(&self) -> &OutputRouter {
        &self.inner.output
    }

    pub fn set_exception_handler(&self, handler: Option<ExceptionHandler>) {
        *self.inner.exception_handler.write() = handler;
    }

    /// Without a handler, traces go to the debugger log.
    pub fn set_breakpoint_trace_handler(&self, handler: Option<BreakpointTraceHandler>) {
        *self.inner.breakpoint_trace_handler.write() = handler;
    }

    /// Without a handler, custom-action hits stop the target.
    pub fn set_custom_break_event_hit_handler(&self, handler: Option<BreakEventHitHandler>) {
        *self.inner.custom_hit_handler.write() = handler;
    }

    /// Failures from worker-dispatched commands that no handler accepted.
    pub fn take_unhandled_faults(&self) -> Vec<SessionError> {
        std::mem::take(&mut *self.inner.faults.lock())
    }

    /// Wait for queued command bodies to finish. Always `true` with inline dispatch.
    pub fn wait_for_commands(&self, timeout: Duration) -> bool {
        self.inner.dispatcher.wait_idle(timeout)
    }

    // Lifecycle queries.

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        self.inner.is_started()
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.inner.state.lock().borrow().attached
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.state.lock().borrow().disposed
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        let guard = self.inner.state.lock();
        let state = guard.borrow();
        let started = self.is_started();
        let running = self.is_running();
        if state.disposed {
            SessionPhase::Disposed
        } else if state.exited && !running {
            SessionPhase::Exited
        } else if running && !started {
            SessionPhase::Starting
        } else if running {
            SessionPhase::Running
        } else if started {
            SessionPhase::Stopped
        } else {
            SessionPhase::Idle
        }
    }

    #[must_use]
    pub fn options(&self) -> DebuggerSessionOptions {
        self.inner.state.lock().borrow().options.clone()
    }

    #[must_use]
    pub fn evaluation_options(&self) -> EvaluationOptions {
        self.inner.state.lock().borrow().options.evaluation.clone()
    }

    pub fn set_evaluation_options(&self, options: EvaluationOptions) {
        self.inner.state.lock().borrow_mut().options.evaluation = options;
    }

    // Commands.

    pub fn run(&self, start: StartInfo, options: DebuggerSessionOptions) -> SessionResult<()> {
        if start.command.trim().is_empty() {
            return Err(SessionError::InvalidArgument {
                name: "start.command",
                reason: "a command to launch is required",
            });
        }
        let _guard = self.inner.state.lock();
        self.store_options(options.clone());
        self.inner.command(RUN, move |inner| {
            inner.backend.on_run(&start, &options)
        })
    }

    pub fn attach_to_process(
        &self,
        process: &ProcessInfo,
        options: DebuggerSessionOptions,
    ) -> SessionResult<()> {
        if process.id == 0 {
            return Err(SessionError::InvalidArgument {
                name: "process",
                reason: "a process id is required",
            });
        }
        let process_id = process.id;
        let _guard = self.inner.state.lock();
        self.store_options(options.clone());
        self.inner.command(ATTACH, move |inner| {
            inner.backend.on_attach_to_process(process_id, &options)?;
            inner.state.lock().borrow_mut().attached = true;
            Ok(())
        })
    }

    pub fn detach(&self) -> SessionResult<()> {
        self.inner.command(DETACH, |inner| {
            inner.backend.on_detach()?;
            inner.state.lock().borrow_mut().attached = false;
            Ok(())
        })
    }

    pub fn continue_execution(&self) -> SessionResult<()> {
        self.inner
            .command(CONTINUE, |inner| inner.backend.on_continue())
    }

    pub fn step_line(&self) -> SessionResult<()> {
        self.inner
            .command(STEP_LINE, |inner| inner.backend.on_step_line())
    }

    pub fn next_line(&self) -> SessionResult<()> {
        self.inner
            .command(NEXT_LINE, |inner| inner.backend.on_next_line())
    }

    pub fn step_instruction(&self) -> SessionResult<()> {
        self.inner
            .command(STEP_INSTRUCTION, |inner| inner.backend.on_step_instruction())
    }

    pub fn next_instruction(&self) -> SessionResult<()> {
        self.inner
            .command(NEXT_INSTRUCTION, |inner| inner.backend.on_next_instruction())
    }

    pub fn finish(&self) -> SessionResult<()> {
        self.inner.command(FINISH, |inner| inner.backend.on_finish())
    }

    pub fn stop(&self) -> SessionResult<()> {
        self.inner.command(STOP, |inner| inner.backend.on_stop())
    }

    pub fn exit(&self) -> SessionResult<()> {
        self.inner.command(EXIT, |inner| inner.backend.on_exit())
    }

    /// Tear down once; later commands become no-ops. A borrowed store is detached.
    pub fn dispose(&self) -> SessionResult<()> {
        self.inner.command(DISPOSE, |inner| {
            let guard = inner.state.lock();
            let detach_store = {
                let mut state = guard.borrow_mut();
                if state.disposed {
                    return Ok(());
                }
                state.disposed = true;
                !state.owned_store
            };
            if detach_store {
                inner.set_breakpoint_store(None);
            }
            debug!("session disposed");
            Ok(())
        })
    }

    pub fn set_active_thread(&self, thread: &ThreadInfo) -> SessionResult<()> {
        let guard = self.inner.state.lock();
        let mut active = thread.clone();
        active.attach(&self.inner.link());
        guard.borrow_mut().active_thread = Some(active);
        if let Err(source) = self
            .inner
            .backend
            .on_set_active_thread(thread.process_id, thread.id)
        {
            let err = SessionError::command("set_active_thread", source);
            if !self.inner.handle_exception(&err) {
                return Err(err);
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn active_thread(&self) -> Option<ThreadInfo> {
        self.inner.state.lock().borrow().active_thread.clone()
    }

    fn store_options(&self, options: DebuggerSessionOptions) {
        let guard = self.inner.state.lock();
        let mut state = guard.borrow_mut();
        if !state.disposed {
            state.options = options;
        }
    }

    // Inspection.

    /// Processes of the debuggee, cached until the next target event.
    pub fn processes(&self) -> SessionResult<Vec<ProcessInfo>> {
        let guard = self.inner.state.lock();
        if let Some(cached) = guard.borrow().processes.clone() {
            return Ok(cached);
        }
        let mut processes = self
            .inner
            .backend
            .get_processes()
            .map_err(|err| SessionError::command("get_processes", err))?;
        let link = self.inner.link();
        for process in &mut processes {
            process.attach(&link);
        }
        guard.borrow_mut().processes = Some(processes.clone());
        Ok(processes)
    }

    pub fn threads(&self, process_id: u64) -> SessionResult<Vec<ThreadInfo>> {
        let _guard = self.inner.state.lock();
        let mut threads = self
            .inner
            .backend
            .get_threads(process_id)
            .map_err(|err| SessionError::command("get_threads", err))?;
        let link = self.inner.link();
        for thread in &mut threads {
            thread.attach(&link);
        }
        Ok(threads)
    }

    pub fn backtrace(&self, process_id: u64, thread_id: u64) -> SessionResult<Option<Backtrace>> {
        let _guard = self.inner.state.lock();
        let mut backtrace = self
            .inner
            .backend
            .get_backtrace(process_id, thread_id)
            .map_err(|err| SessionError::command("get_backtrace", err))?;
        if let Some(backtrace) = backtrace.as_mut() {
            backtrace.attach(&self.inner.link());
        }
        Ok(backtrace)
    }

    pub fn disassemble_file(&self, file: &str) -> SessionResult<Option<Vec<AssemblyLine>>> {
        let _guard = self.inner.state.lock();
        self.inner
            .backend
            .disassemble_file(file)
            .map_err(|err| SessionError::command("disassemble_file", err))
    }

    #[must_use]
    pub fn can_cancel_async_evaluations(&self) -> bool {
        self.inner.backend.can_cancel_async_evaluations()
    }

    /// Forward a cancellation request without waiting for queued commands.
    pub fn cancel_async_evaluations(&self) {
        if self.inner.dispatcher.is_inline() {
            self.inner.backend.cancel_async_evaluations();
            return;
        }
        let backend = Arc::clone(&self.inner.backend);
        let spawned = std::thread::Builder::new()
            .name("trust-debugger-cancel".into())
            .spawn(move || backend.cancel_async_evaluations());
        if let Err(err) = spawned {
            warn!(error = %err, "cancelling on the calling thread");
            self.inner.backend.cancel_async_evaluations();
        }
    }

    // Breakpoints.

    /// The attached store; an owned default store is created on first use.
    #[must_use]
    pub fn breakpoints(&self) -> Arc<BreakpointStore> {
        self.inner.breakpoint_store()
    }

    /// Attach a shared store, or detach with `None`.
    pub fn set_breakpoint_store(&self, store: Option<Arc<BreakpointStore>>) {
        self.inner.set_breakpoint_store(store);
    }

    #[must_use]
    pub fn owns_breakpoint_store(&self) -> bool {
        self.inner.state.lock().borrow().owned_store
    }

    #[must_use]
    pub fn break_event_status(&self, id: BreakEventId) -> BreakEventStatus {
        self.inner.break_event_status(id)
    }

    #[must_use]
    pub fn break_event_status_message(&self, id: BreakEventId) -> String {
        self.inner.break_event_status_message(id)
    }

    /// Binding record for `id`, if this session holds one.
    #[must_use]
    pub fn break_event_info(&self, id: BreakEventId) -> Option<BreakEventInfo> {
        self.inner.bindings.get(id)
    }

    #[must_use]
    pub fn break_event_for_handle(&self, handle: BackendHandle) -> Option<BreakEventInfo> {
        self.inner.bindings.by_handle(handle)
    }

    /// Number of backend handles currently mapped to binding records.
    #[must_use]
    pub fn bound_handle_count(&self) -> usize {
        self.inner.bindings.handle_count()
    }

    // Expressions.

    pub fn set_type_resolver(&self, resolver: Option<TypeResolver>) {
        *self.inner.type_resolver.write() = resolver;
    }

    /// Rewrite type names in `expression` for `location`.
    ///
    /// Without a type resolver the expression is returned as is. Answers,
    /// including failures, are cached for the session's lifetime.
    pub fn resolve_expression(&self, expression: &str, location: &SourceLocation) -> String {
        let Some(types) = self.inner.type_resolver.read().clone() else {
            return expression.to_string();
        };
        let key = format!("{expression} {location}");
        let resolved = self.inner.expressions.get_or_resolve(key, || {
            match self.inner.backend.resolve_expression(expression, location, &types) {
                Ok(resolved) => resolved,
                Err(err) => {
                    warn!(expression, error = %err, "expression resolution failed");
                    self.inner.output.debugger_output(
                        true,
                        &format!("Error while resolving expression: {err}"),
                    );
                    None
                }
            }
        });
        resolved.unwrap_or_else(|| expression.to_string())
    }

    pub fn set_evaluator_provider(&self, provider: Option<EvaluatorProvider>) {
        self.inner.evaluators.set_provider(provider);
    }

    /// Language-specific evaluator for the frame's file, if the provider has one.
    #[must_use]
    pub fn find_evaluator(&self, frame: &StackFrame) -> Option<Arc<dyn ExpressionEvaluator>> {
        self.inner
            .evaluators
            .find(frame.location().file_extension().as_deref())
    }

    /// Evaluator for the frame, falling back to the name-resolving default.
    #[must_use]
    pub fn evaluator(&self, frame: &StackFrame) -> Arc<dyn ExpressionEvaluator> {
        self.inner
            .evaluators
            .evaluator(frame.location().file_extension().as_deref())
    }
}

impl fmt::Debug for DebuggerSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebuggerSession")
            .field("phase", &self.phase())
            .field("bindings", &self.inner.bindings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BreakEventBinding;
    use crate::breakpoints::BreakEvent;
    use crate::error::{BackendError, BackendResult};

    #[derive(Default)]
    struct NullBackend {
        fail_continue: bool,
    }

    impl DebuggerBackend for NullBackend {
        fn on_run(&self, _: &StartInfo, _: &DebuggerSessionOptions) -> BackendResult<()> {
            Ok(())
        }
        fn on_attach_to_process(&self, _: u64, _: &DebuggerSessionOptions) -> BackendResult<()> {
            Ok(())
        }
        fn on_detach(&self) -> BackendResult<()> {
            Ok(())
        }
        fn on_set_active_thread(&self, _: u64, _: u64) -> BackendResult<()> {
            Ok(())
        }
        fn on_stop(&self) -> BackendResult<()> {
            Ok(())
        }
        fn on_exit(&self) -> BackendResult<()> {
            Ok(())
        }
        fn on_step_line(&self) -> BackendResult<()> {
            Ok(())
        }
        fn on_next_line(&self) -> BackendResult<()> {
            Ok(())
        }
        fn on_step_instruction(&self) -> BackendResult<()> {
            Ok(())
        }
        fn on_next_instruction(&self) -> BackendResult<()> {
            Ok(())
        }
        fn on_finish(&self) -> BackendResult<()> {
            Ok(())
        }
        fn on_continue(&self) -> BackendResult<()> {
            if self.fail_continue {
                return Err(BackendError::failed("engine gone"));
            }
            Ok(())
        }
        fn insert_break_event(&self, _: &BreakEvent) -> BackendResult<BreakEventBinding> {
            Ok(BreakEventBinding::bound(BackendHandle(1)))
        }
        fn remove_break_event(&self, _: BackendHandle) -> BackendResult<()> {
            Ok(())
        }
        fn update_break_event(&self, _: BackendHandle, _: &BreakEvent) -> BackendResult<()> {
            Ok(())
        }
        fn enable_break_event(&self, _: BackendHandle, _: bool) -> BackendResult<()> {
            Ok(())
        }
        fn get_threads(&self, process_id: u64) -> BackendResult<Vec<ThreadInfo>> {
            Ok(vec![ThreadInfo::new(process_id, 1, "main")])
        }
        fn get_processes(&self) -> BackendResult<Vec<ProcessInfo>> {
            Ok(vec![ProcessInfo::new(42, "app")])
        }
        fn get_backtrace(&self, _: u64, _: u64) -> BackendResult<Option<Backtrace>> {
            Ok(None)
        }
    }

    fn inline_session(backend: NullBackend) -> DebuggerSession {
        DebuggerSession::with_config(Arc::new(backend), SessionConfig::inline()).unwrap()
    }

    #[test]
    fn phases_follow_lifecycle() {
        let session = inline_session(NullBackend::default());
        assert_eq!(session.phase(), SessionPhase::Idle);
        session
            .run(StartInfo::new("app"), DebuggerSessionOptions::default())
            .unwrap();
        assert_eq!(session.phase(), SessionPhase::Starting);
        session.frontend().notify_started(None);
        assert_eq!(session.phase(), SessionPhase::Running);
        session
            .frontend()
            .notify_target_event(TargetEvent::new(TargetEventKind::TargetStopped));
        assert_eq!(session.phase(), SessionPhase::Stopped);
        session
            .frontend()
            .notify_target_event(TargetEvent::new(TargetEventKind::TargetExited));
        assert_eq!(session.phase(), SessionPhase::Exited);
        assert!(!session.is_started());
        session.dispose().unwrap();
        assert_eq!(session.phase(), SessionPhase::Disposed);
        assert_eq!(session.phase().to_string(), "disposed");
    }

    #[test]
    fn empty_command_is_rejected_before_state_changes() {
        let session = inline_session(NullBackend::default());
        let err = session
            .run(StartInfo::new("  "), DebuggerSessionOptions::default())
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidArgument { .. }));
        assert!(!session.is_running());
        let err = session
            .attach_to_process(&ProcessInfo::new(0, "none"), DebuggerSessionOptions::default())
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidArgument { .. }));
    }

    #[test]
    fn failed_continue_forces_stop_and_propagates_when_unhandled() {
        let session = inline_session(NullBackend { fail_continue: true });
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        session.subscribe_all(move |event: &SessionEvent| sink.lock().push(event.topic()));
        let err = session.continue_execution().unwrap_err();
        assert_eq!(err.to_string(), "continue failed: engine gone");
        assert!(!session.is_running());
        assert_eq!(
            *seen.lock(),
            vec![EventTopic::Started, EventTopic::Stopped, EventTopic::Any]
        );

        session.set_exception_handler(Some(Arc::new(|_: &SessionError| true)));
        assert!(session.continue_execution().is_ok());
    }

    #[test]
    fn disposed_session_ignores_commands() {
        let session = inline_session(NullBackend::default());
        session.dispose().unwrap();
        session.continue_execution().unwrap();
        assert!(!session.is_running());
        assert!(session.is_disposed());
    }

    #[test]
    fn inspection_results_point_back_to_session() {
        let session = inline_session(NullBackend::default());
        let processes = session.processes().unwrap();
        assert!(processes[0].session().is_some());
        let threads = processes[0].threads().unwrap();
        assert_eq!(threads[0].process_id, 42);
        assert!(threads[0].backtrace().unwrap().is_none());
        assert!(session.disassemble_file("/src/a.cs").unwrap().is_none());
    }

    #[test]
    fn resolve_without_type_resolver_returns_input() {
        let session = inline_session(NullBackend::default());
        let location = SourceLocation::new("Main", "/src/a.cs", 1);
        assert_eq!(session.resolve_expression("Foo.Bar", &location), "Foo.Bar");
    }
}
