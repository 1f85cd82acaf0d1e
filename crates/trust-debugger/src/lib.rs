//! Backend-agnostic debugger session protocol.
//!
//! A [`DebuggerSession`] drives a [`DebuggerBackend`] through run, attach,
//! stepping and teardown, keeps breakpoints from a shared
//! [`BreakpointStore`] bound to the engine, and exposes debuggee values as a
//! lazily fetched [`ObjectValue`] tree.

pub mod backend;
pub mod breakpoints;
pub mod config;
pub mod error;
pub mod events;
pub mod output;
pub mod session;
pub mod target;
pub mod value;

pub use backend::{BackendHandle, BreakEventBinding, DebuggerBackend};
pub use breakpoints::{
    BreakEvent, BreakEventId, BreakEventInfo, BreakEventKind, BreakEventStatus, BreakpointStore,
    HitAction, StoreListener,
};
pub use config::{DebuggerSessionOptions, DispatchMode, SessionConfig, SteppingOptions};
pub use error::{
    BackendError, BackendResult, EvalError, EvalResult, SessionError, SessionResult, StoreError,
    ValueError,
};
pub use events::{BusyState, EventTopic, SessionEvent, SubscriptionId, TargetEvent, TargetEventKind};
pub use output::{OutputRouter, OutputWriter};
pub use session::{
    BreakEventHitHandler, BreakpointTraceHandler, DebuggerSession, EvaluatorProvider,
    ExceptionHandler, SessionFrontend, SessionLink, SessionPhase,
};
pub use target::{
    AssemblyLine, Backtrace, BacktraceSource, FrameInfo, ProcessInfo, SourceLocation, StackFrame,
    StartInfo, ThreadInfo,
};
pub use value::{
    EvaluationContext, EvaluationOptions, ExpressionEvaluator, ObjectValue, ObjectValueAdapter,
    ObjectValueKind, ValueReference,
};
