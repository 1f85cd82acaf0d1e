use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use super::{BreakEvent, BreakEventId};
use crate::error::StoreError;

/// Change notifications raised by a [`BreakpointStore`].
///
/// Callbacks run on the editing thread with no store lock held.
pub trait StoreListener: Send + Sync {
    fn break_event_added(&self, _break_event: &BreakEvent) {}

    fn break_event_removed(&self, _break_event: &BreakEvent) {}

    /// Condition or location changed.
    fn break_event_modified(&self, _break_event: &BreakEvent) {}

    fn break_event_enable_changed(&self, _break_event: &BreakEvent) {}

    /// Binding status changed in some session.
    fn break_event_status_changed(&self, _break_event: &BreakEvent) {}

    /// Veto for user edits.
    fn is_read_only(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// A line move applied to the store but not yet announced.
#[must_use]
pub(crate) struct LineAdjustment {
    old: BreakEvent,
    pub(crate) new: BreakEvent,
}

enum Change {
    Added,
    Removed,
    Modified,
    EnableChanged,
    StatusChanged,
}

/// Observable break event collection, shareable across sessions.
#[derive(Default)]
pub struct BreakpointStore {
    events: RwLock<IndexMap<BreakEventId, BreakEvent>>,
    /// Original line of breakpoints moved by `adjust_breakpoint_line`.
    adjusted: Mutex<HashMap<BreakEventId, u32>>,
    listeners: RwLock<Vec<(ListenerId, Arc<dyn StoreListener>)>>,
    next_listener: AtomicU64,
}

impl BreakpointStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Arc<dyn StoreListener>) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) {
        self.listeners.write().retain(|(listener, _)| *listener != id);
    }

    /// `true` when any listener vetoes edits.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.listeners_snapshot()
            .iter()
            .any(|listener| listener.is_read_only())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    #[must_use]
    pub fn get(&self, id: BreakEventId) -> Option<BreakEvent> {
        self.events.read().get(&id).cloned()
    }

    /// Snapshot in insertion order.
    #[must_use]
    pub fn break_events(&self) -> Vec<BreakEvent> {
        self.events.read().values().cloned().collect()
    }

    pub fn add(&self, break_event: BreakEvent) -> Result<BreakEventId, StoreError> {
        self.ensure_writable()?;
        let id = break_event.id();
        self.events.write().insert(id, break_event.clone());
        self.notify(Change::Added, &break_event);
        Ok(id)
    }

    pub fn add_breakpoint(
        &self,
        file: impl Into<String>,
        line: u32,
    ) -> Result<BreakEventId, StoreError> {
        self.add(BreakEvent::breakpoint(file, line))
    }

    pub fn add_catchpoint(&self, exception_name: &str) -> Result<BreakEventId, StoreError> {
        self.add(BreakEvent::catchpoint(exception_name))
    }

    pub fn remove(&self, id: BreakEventId) -> Result<BreakEvent, StoreError> {
        self.ensure_writable()?;
        let removed = self
            .events
            .write()
            .shift_remove(&id)
            .ok_or(StoreError::UnknownBreakEvent(id))?;
        self.adjusted.lock().remove(&id);
        self.notify(Change::Removed, &removed);
        Ok(removed)
    }

    /// Remove every break event, notifying each removal.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.ensure_writable()?;
        let removed = std::mem::take(&mut *self.events.write());
        self.adjusted.lock().clear();
        for break_event in removed.values() {
            self.notify(Change::Removed, break_event);
        }
        Ok(())
    }

    pub fn set_enabled(&self, id: BreakEventId, enabled: bool) -> Result<(), StoreError> {
        self.ensure_writable()?;
        let updated = self.edit(id, |event| {
            let changed = event.enabled != enabled;
            event.enabled = enabled;
            changed
        })?;
        if let Some(event) = updated {
            self.notify(Change::EnableChanged, &event);
        }
        Ok(())
    }

    pub fn set_condition(
        &self,
        id: BreakEventId,
        condition: Option<String>,
    ) -> Result<(), StoreError> {
        self.ensure_writable()?;
        let updated = self.edit(id, |event| {
            let changed = event.condition != condition;
            event.condition = condition;
            changed
        })?;
        if let Some(event) = updated {
            self.notify(Change::Modified, &event);
        }
        Ok(())
    }

    /// User move of a breakpoint to another line.
    pub fn move_breakpoint(&self, id: BreakEventId, line: u32) -> Result<(), StoreError> {
        self.ensure_writable()?;
        let updated = self.edit(id, |event| {
            let changed = event.line().is_some_and(|current| current != line);
            event.set_line(line);
            changed
        })?;
        self.adjusted.lock().remove(&id);
        if let Some(event) = updated {
            self.notify(Change::Modified, &event);
        }
        Ok(())
    }

    /// Programmatic move requested by a backend; raised as remove + add.
    ///
    /// The first original line is remembered for `reset_adjusted_breakpoints`.
    pub fn adjust_breakpoint_line(&self, id: BreakEventId, line: u32) -> Result<(), StoreError> {
        if let Some(adjustment) = self.apply_line_adjustment(id, line)? {
            self.announce_line_adjustment(adjustment);
        }
        Ok(())
    }

    /// Move the break event without notifying listeners yet.
    ///
    /// Returns `None` when nothing moved.
    pub(crate) fn apply_line_adjustment(
        &self,
        id: BreakEventId,
        line: u32,
    ) -> Result<Option<LineAdjustment>, StoreError> {
        let mut events = self.events.write();
        let event = events
            .get_mut(&id)
            .ok_or(StoreError::UnknownBreakEvent(id))?;
        let Some(original) = event.line() else {
            return Ok(None);
        };
        if original == line {
            return Ok(None);
        }
        self.adjusted.lock().entry(id).or_insert(original);
        let old = event.clone();
        event.set_line(line);
        debug!(%id, from = original, to = line, "adjusted breakpoint line");
        Ok(Some(LineAdjustment {
            old,
            new: event.clone(),
        }))
    }

    pub(crate) fn announce_line_adjustment(&self, adjustment: LineAdjustment) {
        self.notify(Change::Removed, &adjustment.old);
        self.notify(Change::Added, &adjustment.new);
    }

    /// Move adjusted breakpoints back to their original lines.
    pub fn reset_adjusted_breakpoints(&self) {
        let adjusted = std::mem::take(&mut *self.adjusted.lock());
        for (id, line) in adjusted {
            let restored = {
                let mut events = self.events.write();
                events.get_mut(&id).map(|event| {
                    event.set_line(line);
                    event.clone()
                })
            };
            if let Some(event) = restored {
                self.notify(Change::Modified, &event);
            }
        }
    }

    pub fn notify_status_changed(&self, id: BreakEventId) {
        if let Some(event) = self.get(id) {
            self.notify(Change::StatusChanged, &event);
        }
    }

    fn ensure_writable(&self) -> Result<(), StoreError> {
        if self.is_read_only() {
            return Err(StoreError::ReadOnly);
        }
        Ok(())
    }

    /// Apply `apply` in place; returns the new snapshot when it reports a change.
    fn edit(
        &self,
        id: BreakEventId,
        apply: impl FnOnce(&mut BreakEvent) -> bool,
    ) -> Result<Option<BreakEvent>, StoreError> {
        let mut events = self.events.write();
        let event = events
            .get_mut(&id)
            .ok_or(StoreError::UnknownBreakEvent(id))?;
        Ok(apply(event).then(|| event.clone()))
    }

    fn listeners_snapshot(&self) -> Vec<Arc<dyn StoreListener>> {
        self.listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }

    fn notify(&self, change: Change, break_event: &BreakEvent) {
        for listener in self.listeners_snapshot() {
            match change {
                Change::Added => listener.break_event_added(break_event),
                Change::Removed => listener.break_event_removed(break_event),
                Change::Modified => listener.break_event_modified(break_event),
                Change::EnableChanged => listener.break_event_enable_changed(break_event),
                Change::StatusChanged => listener.break_event_status_changed(break_event),
            }
        }
    }
}

impl fmt::Debug for BreakpointStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BreakpointStore")
            .field("events", &self.events.read().len())
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}
