use std::collections::HashMap;
use std::thread::{self, ThreadId};

use indexmap::IndexMap;
use parking_lot::Mutex;

use super::{BreakEventId, BreakEventInfo, BreakEventStatus};
use crate::backend::BackendHandle;

#[derive(Default)]
struct Tables {
    by_id: IndexMap<BreakEventId, BreakEventInfo>,
    by_handle: HashMap<BackendHandle, BreakEventId>,
}

impl Tables {
    fn unregister(&mut self, info: &BreakEventInfo) {
        if let Some(handle) = info.handle {
            if self.by_handle.get(&handle) == Some(&info.id()) {
                self.by_handle.remove(&handle);
            }
        }
    }
}

/// Per-session binding records with a reverse index by backend handle.
///
/// Every accessor takes the table lock for its own duration only; callers
/// never hold it across backend calls.
#[derive(Default)]
pub struct BindingTable {
    tables: Mutex<Tables>,
    /// Threads with an open programmatic edit scope, once per nesting level.
    adjusting: Mutex<Vec<ThreadId>>,
}

impl BindingTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.lock().by_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.lock().by_id.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: BreakEventId) -> bool {
        self.tables.lock().by_id.contains_key(&id)
    }

    #[must_use]
    pub fn get(&self, id: BreakEventId) -> Option<BreakEventInfo> {
        self.tables.lock().by_id.get(&id).cloned()
    }

    #[must_use]
    pub fn contains_handle(&self, handle: BackendHandle) -> bool {
        self.tables.lock().by_handle.contains_key(&handle)
    }

    #[must_use]
    pub fn handle_count(&self) -> usize {
        self.tables.lock().by_handle.len()
    }

    #[must_use]
    pub fn by_handle(&self, handle: BackendHandle) -> Option<BreakEventInfo> {
        let tables = self.tables.lock();
        let id = tables.by_handle.get(&handle)?;
        tables.by_id.get(id).cloned()
    }

    /// Insert or replace the record for `info.id()`, keeping the reverse index in step.
    pub fn insert(&self, info: BreakEventInfo) {
        let mut tables = self.tables.lock();
        let id = info.id();
        if let Some(previous) = tables.by_id.shift_remove(&id) {
            tables.unregister(&previous);
        }
        if let Some(handle) = info.handle {
            tables.by_handle.insert(handle, id);
        }
        tables.by_id.insert(id, info);
    }

    pub fn remove(&self, id: BreakEventId) -> Option<BreakEventInfo> {
        let mut tables = self.tables.lock();
        let info = tables.by_id.shift_remove(&id)?;
        tables.unregister(&info);
        Some(info)
    }

    /// Update the status of the record bound to `handle`.
    pub fn set_status_by_handle(
        &self,
        handle: BackendHandle,
        status: BreakEventStatus,
        message: Option<String>,
    ) -> Option<BreakEventId> {
        let mut tables = self.tables.lock();
        let id = *tables.by_handle.get(&handle)?;
        let info = tables.by_id.get_mut(&id)?;
        info.status = status;
        info.status_message = message;
        Some(id)
    }

    /// Snapshot of all records in insertion order.
    #[must_use]
    pub fn entries(&self) -> Vec<BreakEventInfo> {
        self.tables.lock().by_id.values().cloned().collect()
    }

    /// Records matching `filter`, snapshotted under one lock.
    #[must_use]
    pub fn entries_where(&self, filter: impl Fn(&BreakEventInfo) -> bool) -> Vec<BreakEventInfo> {
        self.tables
            .lock()
            .by_id
            .values()
            .filter(|info| filter(info))
            .cloned()
            .collect()
    }

    /// Open a programmatic edit scope.
    ///
    /// While the token lives, `is_adjusting` reports `true` on this thread
    /// only. Other threads never wait on an open scope.
    pub fn begin_programmatic_edit(&self) -> ProgrammaticEdit<'_> {
        let owner = thread::current().id();
        self.adjusting.lock().push(owner);
        ProgrammaticEdit { table: self, owner }
    }

    #[must_use]
    pub fn is_adjusting(&self) -> bool {
        let current = thread::current().id();
        self.adjusting.lock().contains(&current)
    }
}

impl std::fmt::Debug for BindingTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tables = self.tables.lock();
        f.debug_struct("BindingTable")
            .field("entries", &tables.by_id.len())
            .field("handles", &tables.by_handle.len())
            .finish()
    }
}

/// Scope token for self-triggered store edits.
pub struct ProgrammaticEdit<'a> {
    table: &'a BindingTable,
    owner: ThreadId,
}

impl Drop for ProgrammaticEdit<'_> {
    fn drop(&mut self) {
        let mut adjusting = self.table.adjusting.lock();
        if let Some(index) = adjusting.iter().rposition(|owner| *owner == self.owner) {
            adjusting.swap_remove(index);
        }
    }
}
