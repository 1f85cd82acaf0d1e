use std::sync::{Arc, Weak};

use tracing::{debug, trace};

use super::{DebuggerSession, SessionInner};
use crate::backend::BackendHandle;
use crate::breakpoints::{BreakEventId, BreakEventInfo, BreakEventStatus};
use crate::error::StoreError;
use crate::events::{BusyState, SessionEvent, TargetEvent};
use crate::target::ThreadInfo;

/// Notification handle a backend uses to report back to its session.
///
/// Holds a weak reference; calls after the session is dropped are ignored.
#[derive(Clone)]
pub struct SessionFrontend {
    session: Weak<SessionInner>,
}

impl SessionFrontend {
    pub(crate) fn new(session: Weak<SessionInner>) -> Self {
        Self { session }
    }

    fn inner(&self) -> Option<Arc<SessionInner>> {
        let inner = self.session.upgrade();
        if inner.is_none() {
            trace!("notification for a dropped session");
        }
        inner
    }

    #[must_use]
    pub fn session(&self) -> Option<DebuggerSession> {
        self.session.upgrade().map(|inner| DebuggerSession { inner })
    }

    pub fn notify_target_event(&self, event: TargetEvent) {
        if let Some(inner) = self.inner() {
            inner.on_target_event(event);
        }
    }

    /// The engine is initialized; pending break events get bound.
    pub fn notify_started(&self, thread: Option<ThreadInfo>) {
        if let Some(inner) = self.inner() {
            inner.on_started(thread);
        }
    }

    pub fn target_output(&self, is_stderr: bool, text: &str) {
        if let Some(inner) = self.inner() {
            inner.output.target_output(is_stderr, text);
        }
    }

    pub fn debugger_output(&self, is_stderr: bool, text: &str) {
        if let Some(inner) = self.inner() {
            inner.output.debugger_output(is_stderr, text);
        }
    }

    /// `path` is the absolute path of the loaded file.
    pub fn source_file_loaded(&self, path: &str) {
        if let Some(inner) = self.inner() {
            inner.source_file_loaded(path);
        }
    }

    pub fn source_file_unloaded(&self, path: &str) {
        if let Some(inner) = self.inner() {
            inner.source_file_unloaded(path);
        }
    }

    pub fn set_busy_state(&self, state: BusyState) {
        if let Some(inner) = self.inner() {
            debug!(busy = state.is_busy, "busy state changed");
            inner.observers.emit(&SessionEvent::BusyStateChanged(state));
        }
    }

    /// Update the status of the binding behind `handle` and tell store observers.
    pub fn set_break_event_status(
        &self,
        handle: BackendHandle,
        status: BreakEventStatus,
        message: Option<String>,
    ) {
        if let Some(inner) = self.inner() {
            inner.set_status_by_handle(handle, status, message);
        }
    }

    #[must_use]
    pub fn break_event_for_handle(&self, handle: BackendHandle) -> Option<BreakEventInfo> {
        self.inner()?.bindings.by_handle(handle)
    }

    /// Report the evaluated trace text of a tracepoint hit.
    pub fn breakpoint_trace(&self, handle: BackendHandle, trace: &str) {
        if let Some(inner) = self.inner() {
            inner.breakpoint_trace(handle, trace);
        }
    }

    /// Ask whether a custom-action hit should stop the target.
    #[must_use]
    pub fn custom_break_event_hit(&self, action_id: &str, handle: BackendHandle) -> bool {
        self.inner()
            .map_or(true, |inner| inner.custom_break_event_hit(action_id, handle))
    }

    /// Move a breakpoint to the line the engine actually bound.
    pub fn adjust_breakpoint_location(&self, id: BreakEventId, line: u32) -> Result<(), StoreError> {
        match self.inner() {
            Some(inner) => inner.adjust_breakpoint_location(id, line),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for SessionFrontend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionFrontend")
            .field("live", &(self.session.strong_count() > 0))
            .finish()
    }
}
