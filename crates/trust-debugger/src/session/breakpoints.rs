//! Breakpoint binding engine.
//! - insert/remove/update/enable against the backend with logged recovery
//! - store attach/detach and change subscription
//! - retry on source load, drop on source unload

use std::path::{Path, MAIN_SEPARATOR};
use std::sync::{Arc, Weak};

use tracing::{debug, info, warn};

use super::SessionInner;
use crate::backend::BackendHandle;
use crate::breakpoints::{
    BreakEvent, BreakEventId, BreakEventInfo, BreakEventStatus, BreakpointStore, StoreListener,
    NOT_HIT_MESSAGE,
};
use crate::error::{BackendError, SessionError, StoreError};

impl SessionInner {
    pub(crate) fn current_store(&self) -> Option<Arc<BreakpointStore>> {
        self.state.lock().borrow().store.clone()
    }

    /// The attached store, creating an owned default one on first use.
    pub(crate) fn breakpoint_store(self: &Arc<Self>) -> Arc<BreakpointStore> {
        let guard = self.state.lock();
        if let Some(store) = guard.borrow().store.clone() {
            return store;
        }
        if guard.borrow().disposed {
            return Arc::new(BreakpointStore::new());
        }
        let store = Arc::new(BreakpointStore::new());
        self.set_breakpoint_store(Some(Arc::clone(&store)));
        guard.borrow_mut().owned_store = true;
        store
    }

    /// Swap the attached store.
    ///
    /// The old store's break events are unbound and each gets a status-changed
    /// notification. Break events bound from the new store are not announced.
    pub(crate) fn set_breakpoint_store(self: &Arc<Self>, store: Option<Arc<BreakpointStore>>) {
        let guard = self.state.lock();
        let (old, subscription) = {
            let mut state = guard.borrow_mut();
            (state.store.take(), state.store_subscription.take())
        };
        if let Some(old) = old {
            for break_event in old.break_events() {
                self.remove_break_event(break_event.id());
                old.notify_status_changed(break_event.id());
            }
            if let Some(subscription) = subscription {
                old.unsubscribe(subscription);
            }
            old.reset_adjusted_breakpoints();
        }
        {
            let mut state = guard.borrow_mut();
            state.store.clone_from(&store);
            state.owned_store = false;
        }
        let Some(store) = store else {
            return;
        };
        if self.is_started() {
            for break_event in store.break_events() {
                self.add_break_event(&break_event);
            }
        }
        let listener = Arc::new(StoreHook {
            session: Arc::downgrade(self),
        });
        let subscription = store.subscribe(listener);
        guard.borrow_mut().store_subscription = Some(subscription);
    }

    /// Bind every break event of the attached store.
    pub(crate) fn bind_all(self: &Arc<Self>) {
        let store = self.breakpoint_store();
        for break_event in store.break_events() {
            self.add_break_event(&break_event);
        }
    }

    pub(crate) fn add_break_event(&self, break_event: &BreakEvent) {
        match self.backend.insert_break_event(break_event) {
            Ok(binding) => {
                debug!(%break_event, handle = %binding.handle, status = ?binding.status, "bound break event");
                self.bindings.insert(BreakEventInfo {
                    break_event: break_event.clone(),
                    handle: Some(binding.handle),
                    status: binding.status,
                    status_message: binding.status_message,
                });
            }
            Err(err) => self.record_bind_failure(break_event, err),
        }
    }

    /// Log, record as `BindError` and offer to the handler. Never escalates.
    fn record_bind_failure(&self, break_event: &BreakEvent, err: BackendError) {
        let text = err.to_string();
        self.output
            .debugger_output(false, &break_event.bind_failure_message(&text));
        warn!(%break_event, error = %text, "could not bind break event");
        self.bindings.insert(BreakEventInfo {
            break_event: break_event.clone(),
            handle: None,
            status: BreakEventStatus::BindError,
            status_message: Some(text),
        });
        self.handle_exception(&SessionError::BreakEvent {
            description: break_event.to_string(),
            source: err,
        });
    }

    /// Unbind; `false` when the backend refused, leaving the record for a retry.
    pub(crate) fn remove_break_event(&self, id: BreakEventId) -> bool {
        let Some(info) = self.bindings.get(id) else {
            return true;
        };
        if let Some(handle) = info.handle {
            if let Err(err) = self.backend.remove_break_event(handle) {
                if self.is_started() {
                    self.output.debugger_output(false, &format!("{err}\n"));
                }
                warn!(break_event = %info.break_event, error = %err, "could not remove break event");
                self.handle_exception(&SessionError::BreakEvent {
                    description: info.break_event.to_string(),
                    source: err,
                });
                return false;
            }
        }
        self.bindings.remove(id);
        true
    }

    pub(crate) fn update_break_event(&self, break_event: &BreakEvent) {
        let Some(mut info) = self.bindings.get(break_event.id()) else {
            return;
        };
        let Some(handle) = info.handle else {
            return;
        };
        match self.backend.update_break_event(handle, break_event) {
            Ok(()) => {
                info.break_event = break_event.clone();
                self.bindings.insert(info);
            }
            Err(err) => self.report_edit_failure(break_event, err),
        }
    }

    pub(crate) fn update_break_event_enabled(&self, break_event: &BreakEvent) {
        let Some(mut info) = self.bindings.get(break_event.id()) else {
            return;
        };
        let Some(handle) = info.handle else {
            return;
        };
        match self.backend.enable_break_event(handle, break_event.enabled) {
            Ok(()) => {
                info.break_event.enabled = break_event.enabled;
                self.bindings.insert(info);
            }
            Err(err) => self.report_edit_failure(break_event, err),
        }
    }

    fn report_edit_failure(&self, break_event: &BreakEvent, err: BackendError) {
        if self.is_started() {
            self.output.debugger_output(false, &format!("{err}\n"));
        }
        warn!(%break_event, error = %err, "could not update break event");
        self.handle_exception(&SessionError::BreakEvent {
            description: break_event.to_string(),
            source: err,
        });
    }

    pub(crate) fn break_event_status(&self, id: BreakEventId) -> BreakEventStatus {
        if !self.is_started() {
            return BreakEventStatus::NotBound;
        }
        self.bindings
            .get(id)
            .map_or(BreakEventStatus::NotBound, |info| info.status)
    }

    pub(crate) fn break_event_status_message(&self, id: BreakEventId) -> String {
        if !self.is_started() {
            return NOT_HIT_MESSAGE.to_string();
        }
        self.bindings
            .get(id)
            .map_or_else(|| NOT_HIT_MESSAGE.to_string(), |info| info.message())
    }

    pub(crate) fn set_status_by_handle(
        &self,
        handle: BackendHandle,
        status: BreakEventStatus,
        message: Option<String>,
    ) {
        let Some(id) = self.bindings.set_status_by_handle(handle, status, message) else {
            debug!(%handle, "status update for unknown handle");
            return;
        };
        if let Some(store) = self.current_store() {
            store.notify_status_changed(id);
        }
    }

    /// Move a breakpoint on backend request without rebinding it here.
    ///
    /// The store move and the binding update happen under the state lock.
    /// Listeners hear about the move after the lock is released, while the
    /// edit scope still hides it from this session's own hook.
    pub(crate) fn adjust_breakpoint_location(&self, id: BreakEventId, line: u32) -> Result<(), StoreError> {
        let guard = self.state.lock();
        let Some(store) = guard.borrow().store.clone() else {
            return Err(StoreError::UnknownBreakEvent(id));
        };
        let _edit = self.bindings.begin_programmatic_edit();
        let Some(adjustment) = store.apply_line_adjustment(id, line)? else {
            return Ok(());
        };
        if let Some(mut info) = self.bindings.get(id) {
            info.break_event = adjustment.new.clone();
            self.bindings.insert(info);
        }
        drop(guard);
        store.announce_line_adjustment(adjustment);
        Ok(())
    }

    /// Retry unbound breakpoints in `path`.
    pub(crate) fn source_file_loaded(&self, path: &str) {
        if !self.config.auto_retry_unbound {
            return;
        }
        let loaded = absolute(path);
        let pending = self.bindings.entries_where(|info| {
            matches!(
                info.status,
                BreakEventStatus::NotBound | BreakEventStatus::BindError
            ) && info
                .break_event
                .file()
                .is_some_and(|file| same_path(&absolute(file), &loaded))
        });
        if !pending.is_empty() {
            info!(file = path, count = pending.len(), "retrying unbound breakpoints");
        }
        for info in pending {
            self.retry_bind(&info.break_event);
        }
    }

    fn retry_bind(&self, break_event: &BreakEvent) {
        match self.backend.insert_break_event(break_event) {
            Ok(binding) => {
                self.bindings.insert(BreakEventInfo {
                    break_event: break_event.clone(),
                    handle: Some(binding.handle),
                    status: binding.status,
                    status_message: binding.status_message,
                });
                if let Some(store) = self.current_store() {
                    store.notify_status_changed(break_event.id());
                }
            }
            Err(err) => self.record_bind_failure(break_event, err),
        }
    }

    /// Drop bound breakpoints in `path`; each gets one status-changed notification.
    pub(crate) fn source_file_unloaded(&self, path: &str) {
        if !self.config.auto_retry_unbound {
            return;
        }
        let unloaded = absolute(path);
        let stale = self.bindings.entries_where(|info| {
            info.status == BreakEventStatus::Bound
                && info
                    .break_event
                    .file()
                    .is_some_and(|file| same_path(&absolute(file), &unloaded))
        });
        let store = self.current_store();
        for info in stale {
            self.bindings.remove(info.id());
            if let Some(store) = store.as_ref() {
                store.notify_status_changed(info.id());
            }
        }
    }

    /// Store read-only hook. Gives up on the state lock after the configured wait.
    pub(crate) fn breakpoints_read_only(&self) -> bool {
        match self.state.try_lock_for(self.config.read_only_check_timeout) {
            Some(_guard) => !self.backend.allow_break_event_changes(),
            None => true,
        }
    }
}

fn absolute(path: &str) -> String {
    std::path::absolute(Path::new(path))
        .map(|path| path.to_string_lossy().into_owned())
        .unwrap_or_else(|_| path.to_string())
}

/// Case-insensitive only on hosts with `\` separators.
fn same_path(left: &str, right: &str) -> bool {
    if MAIN_SEPARATOR == '\\' {
        left.eq_ignore_ascii_case(right)
    } else {
        left == right
    }
}

/// Store subscription held by a session.
struct StoreHook {
    session: Weak<SessionInner>,
}

impl StoreHook {
    /// Run `apply` under the state lock when the session is live and started.
    fn with_started(&self, apply: impl FnOnce(&Arc<SessionInner>)) {
        let Some(inner) = self.session.upgrade() else {
            return;
        };
        let _guard = inner.state.lock();
        if inner.is_started() {
            apply(&inner);
        }
    }
}

impl StoreListener for StoreHook {
    fn break_event_added(&self, break_event: &BreakEvent) {
        if self
            .session
            .upgrade()
            .is_some_and(|inner| inner.bindings.is_adjusting())
        {
            return;
        }
        self.with_started(|inner| inner.add_break_event(break_event));
    }

    fn break_event_removed(&self, break_event: &BreakEvent) {
        if self
            .session
            .upgrade()
            .is_some_and(|inner| inner.bindings.is_adjusting())
        {
            return;
        }
        self.with_started(|inner| {
            inner.remove_break_event(break_event.id());
        });
    }

    fn break_event_modified(&self, break_event: &BreakEvent) {
        self.with_started(|inner| inner.update_break_event(break_event));
    }

    fn break_event_enable_changed(&self, break_event: &BreakEvent) {
        self.with_started(|inner| inner.update_break_event_enabled(break_event));
    }

    fn is_read_only(&self) -> bool {
        self.session
            .upgrade()
            .is_some_and(|inner| inner.breakpoints_read_only())
    }
}
