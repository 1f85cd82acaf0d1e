//! Contract implemented by concrete debugging engines.

use std::fmt;

use crate::breakpoints::{BreakEvent, BreakEventStatus};
use crate::config::DebuggerSessionOptions;
use crate::error::BackendResult;
use crate::session::SessionFrontend;
use crate::target::{AssemblyLine, Backtrace, ProcessInfo, SourceLocation, StartInfo, ThreadInfo};
use crate::value::{resolve_type_names, TypeResolver};

/// Opaque identifier a backend assigns to a bound break event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BackendHandle(pub u64);

impl fmt::Display for BackendHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Result of a successful `insert_break_event`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakEventBinding {
    pub handle: BackendHandle,
    pub status: BreakEventStatus,
    pub status_message: Option<String>,
}

impl BreakEventBinding {
    /// A binding the backend considers enforceable.
    #[must_use]
    pub fn bound(handle: BackendHandle) -> Self {
        Self {
            handle,
            status: BreakEventStatus::Bound,
            status_message: None,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: BreakEventStatus, message: Option<String>) -> Self {
        self.status = status;
        self.status_message = message;
        self
    }
}

/// Operations the session calls on its engine.
///
/// Command bodies are serialized by the session, so implementations never see
/// two of `on_run` .. `on_continue` concurrently. Inspection calls
/// (`get_threads`, `get_backtrace`, ...) are serialized with them as well.
pub trait DebuggerBackend: Send + Sync {
    /// Called once when the session is created.
    fn connect(&self, _frontend: SessionFrontend) {}

    fn on_run(&self, start: &StartInfo, options: &DebuggerSessionOptions) -> BackendResult<()>;

    fn on_attach_to_process(
        &self,
        process_id: u64,
        options: &DebuggerSessionOptions,
    ) -> BackendResult<()>;

    fn on_detach(&self) -> BackendResult<()>;

    fn on_set_active_thread(&self, process_id: u64, thread_id: u64) -> BackendResult<()>;

    fn on_stop(&self) -> BackendResult<()>;

    fn on_exit(&self) -> BackendResult<()>;

    fn on_step_line(&self) -> BackendResult<()>;

    fn on_next_line(&self) -> BackendResult<()>;

    fn on_step_instruction(&self) -> BackendResult<()>;

    fn on_next_instruction(&self) -> BackendResult<()>;

    fn on_finish(&self) -> BackendResult<()>;

    fn on_continue(&self) -> BackendResult<()>;

    fn insert_break_event(&self, break_event: &BreakEvent) -> BackendResult<BreakEventBinding>;

    fn remove_break_event(&self, handle: BackendHandle) -> BackendResult<()>;

    /// Condition or location changed on a bound break event.
    fn update_break_event(&self, handle: BackendHandle, break_event: &BreakEvent)
        -> BackendResult<()>;

    fn enable_break_event(&self, handle: BackendHandle, enable: bool) -> BackendResult<()>;

    /// `false` while the engine cannot accept break event edits.
    fn allow_break_event_changes(&self) -> bool {
        true
    }

    fn get_threads(&self, process_id: u64) -> BackendResult<Vec<ThreadInfo>>;

    fn get_processes(&self) -> BackendResult<Vec<ProcessInfo>>;

    fn get_backtrace(&self, process_id: u64, thread_id: u64) -> BackendResult<Option<Backtrace>>;

    fn disassemble_file(&self, _file: &str) -> BackendResult<Option<Vec<AssemblyLine>>> {
        Ok(None)
    }

    fn can_cancel_async_evaluations(&self) -> bool {
        false
    }

    /// Advisory; the engine decides whether and when it takes effect.
    fn cancel_async_evaluations(&self) {}

    /// Rewrite `expression` so type names resolve at `location`.
    fn resolve_expression(
        &self,
        expression: &str,
        location: &SourceLocation,
        types: &TypeResolver,
    ) -> BackendResult<Option<String>> {
        Ok(Some(resolve_type_names(expression, location, types)))
    }
}
