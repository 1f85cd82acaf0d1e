//! Break events and their session-local bindings.
//! - BreakEvent: user intent to stop (breakpoint or catchpoint) plus its hit action
//! - BreakpointStore: shared, observable collection of break events
//! - BindingTable: per-session binding records keyed by id and backend handle

mod bindings;
mod store;

use std::fmt;
use std::ops::BitOr;
use std::sync::atomic::{AtomicU64, Ordering};

use smol_str::SmolStr;

use crate::backend::BackendHandle;

pub use bindings::{BindingTable, ProgrammaticEdit};
pub use store::{BreakpointStore, ListenerId, StoreListener};

static NEXT_BREAK_EVENT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a break event, stable across edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BreakEventId(u64);

impl BreakEventId {
    fn next() -> Self {
        Self(NEXT_BREAK_EVENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BreakEventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "break event {}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakEventKind {
    Breakpoint {
        file: String,
        line: u32,
        column: Option<u32>,
    },
    Catchpoint {
        exception_name: SmolStr,
        include_subclasses: bool,
    },
}

/// What a backend does when a break event is hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HitAction(u8);

impl HitAction {
    pub const NONE: Self = Self(0);
    /// Stop the target.
    pub const BREAK: Self = Self(1);
    /// Evaluate `trace_expression` and report it as a trace.
    pub const PRINT_EXPRESSION: Self = Self(1 << 1);
    /// Ask the custom hit handler whether to stop.
    pub const CUSTOM_ACTION: Self = Self(1 << 2);

    #[must_use]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl Default for HitAction {
    fn default() -> Self {
        Self::BREAK
    }
}

impl BitOr for HitAction {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Snapshot of a break event. The store owns the live copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakEvent {
    id: BreakEventId,
    pub kind: BreakEventKind,
    pub enabled: bool,
    pub condition: Option<String>,
    pub hit_action: HitAction,
    /// Expression traced on hit; `{name}` placeholders are the backend's business.
    pub trace_expression: Option<String>,
    pub custom_action_id: Option<SmolStr>,
}

impl BreakEvent {
    #[must_use]
    pub fn breakpoint(file: impl Into<String>, line: u32) -> Self {
        Self::with_kind(BreakEventKind::Breakpoint {
            file: file.into(),
            line,
            column: None,
        })
    }

    #[must_use]
    pub fn catchpoint(exception_name: impl Into<SmolStr>) -> Self {
        Self::with_kind(BreakEventKind::Catchpoint {
            exception_name: exception_name.into(),
            include_subclasses: true,
        })
    }

    fn with_kind(kind: BreakEventKind) -> Self {
        Self {
            id: BreakEventId::next(),
            kind,
            enabled: true,
            condition: None,
            hit_action: HitAction::default(),
            trace_expression: None,
            custom_action_id: None,
        }
    }

    /// Turn into a tracepoint: print `expression` on hit instead of stopping.
    #[must_use]
    pub fn with_trace(mut self, expression: impl Into<String>) -> Self {
        self.hit_action = HitAction::PRINT_EXPRESSION;
        self.trace_expression = Some(expression.into());
        self
    }

    /// Route hits through the custom hit handler under `action_id`.
    #[must_use]
    pub fn with_custom_action(mut self, action_id: impl Into<SmolStr>) -> Self {
        self.hit_action = self.hit_action | HitAction::CUSTOM_ACTION;
        self.custom_action_id = Some(action_id.into());
        self
    }

    #[must_use]
    pub fn id(&self) -> BreakEventId {
        self.id
    }

    #[must_use]
    pub fn file(&self) -> Option<&str> {
        match &self.kind {
            BreakEventKind::Breakpoint { file, .. } => Some(file),
            BreakEventKind::Catchpoint { .. } => None,
        }
    }

    #[must_use]
    pub fn line(&self) -> Option<u32> {
        match &self.kind {
            BreakEventKind::Breakpoint { line, .. } => Some(*line),
            BreakEventKind::Catchpoint { .. } => None,
        }
    }

    #[must_use]
    pub fn exception_name(&self) -> Option<&str> {
        match &self.kind {
            BreakEventKind::Catchpoint { exception_name, .. } => Some(exception_name),
            BreakEventKind::Breakpoint { .. } => None,
        }
    }

    /// Diagnostic written to the debugger log when binding fails.
    #[must_use]
    pub fn bind_failure_message(&self, error: &str) -> String {
        match &self.kind {
            BreakEventKind::Breakpoint { file, line, .. } => {
                format!("Could not set breakpoint at location '{file}:{line}' ({error})\n")
            }
            BreakEventKind::Catchpoint { exception_name, .. } => {
                format!("Could not set catchpoint for exception '{exception_name}' ({error})\n")
            }
        }
    }

    pub(crate) fn set_line(&mut self, new_line: u32) {
        if let BreakEventKind::Breakpoint { line, .. } = &mut self.kind {
            *line = new_line;
        }
    }
}

impl fmt::Display for BreakEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            BreakEventKind::Breakpoint { file, line, column } => {
                write!(f, "{file}:{line}")?;
                if let Some(column) = column {
                    write!(f, ":{column}")?;
                }
                Ok(())
            }
            BreakEventKind::Catchpoint { exception_name, .. } => {
                write!(f, "catch {exception_name}")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BreakEventStatus {
    #[default]
    NotBound,
    Bound,
    Invalid,
    BindError,
    Disconnected,
}

impl BreakEventStatus {
    /// Default human-readable text for a status recorded in the binding table.
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::BindError => "The breakpoint could not be bound",
            Self::Invalid => "The breakpoint location is invalid",
            Self::NotBound => "The breakpoint could not yet be bound to a valid location",
            Self::Bound | Self::Disconnected => "",
        }
    }
}

/// Message reported for break events with no binding record.
pub const NOT_HIT_MESSAGE: &str = "The breakpoint will not currently be hit";

/// Session-local binding record for one break event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakEventInfo {
    pub break_event: BreakEvent,
    pub handle: Option<BackendHandle>,
    pub status: BreakEventStatus,
    pub status_message: Option<String>,
}

impl BreakEventInfo {
    #[must_use]
    pub fn new(break_event: BreakEvent) -> Self {
        Self {
            break_event,
            handle: None,
            status: BreakEventStatus::NotBound,
            status_message: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> BreakEventId {
        self.break_event.id()
    }

    #[must_use]
    pub fn message(&self) -> String {
        match &self.status_message {
            Some(message) => message.clone(),
            None => self.status.message().to_string(),
        }
    }
}
