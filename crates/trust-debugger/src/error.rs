//! Error types for sessions, backends, breakpoints and evaluation.

use smol_str::SmolStr;
use thiserror::Error;

use crate::breakpoints::BreakEventId;

pub type SessionResult<T> = Result<T, SessionError>;
pub type BackendResult<T> = Result<T, BackendError>;
pub type EvalResult<T> = Result<T, EvalError>;

/// Failure reported by a concrete debugging backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Generic backend failure carrying the engine's message.
    #[error("{0}")]
    Failed(String),

    /// The backend does not implement the requested operation.
    #[error("operation '{0}' is not supported by this backend")]
    NotSupported(&'static str),

    /// The operation needs a live target.
    #[error("target is not running")]
    NotRunning,

    /// A backend handle did not map to a known binding.
    #[error("unknown backend handle {0}")]
    UnknownHandle(u64),
}

impl BackendError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Errors surfaced by the session layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Caller-contract violation detected before touching session state.
    #[error("invalid argument '{name}': {reason}")]
    InvalidArgument {
        name: &'static str,
        reason: &'static str,
    },

    /// A backend operation failed while running a command.
    #[error("{command} failed: {source}")]
    Command {
        command: &'static str,
        #[source]
        source: BackendError,
    },

    /// Binding, unbinding or updating a break event failed.
    #[error("{description}: {source}")]
    BreakEvent {
        description: String,
        #[source]
        source: BackendError,
    },

    /// A dispatched command body panicked on a worker thread.
    #[error("command '{command}' panicked: {message}")]
    WorkerPanicked {
        command: &'static str,
        message: String,
    },

    /// A dispatch worker thread could not be started.
    #[error("failed to spawn dispatch worker: {0}")]
    ThreadSpawn(SmolStr),

    /// The object is not attached to a live session.
    #[error("object is not attached to a live debugger session")]
    Detached,

    /// Invalid session configuration.
    #[error("invalid debugger configuration: {0}")]
    InvalidConfig(SmolStr),
}

impl SessionError {
    pub(crate) fn command(command: &'static str, source: BackendError) -> Self {
        Self::Command { command, source }
    }
}

/// Failures raised while evaluating expressions or materializing values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    /// The expression form is not supported by this evaluator.
    #[error("{0}")]
    NotSupported(String),

    /// Evaluation ran but failed (bad operand, backend refusal, ...).
    #[error("{0}")]
    Evaluation(String),

    /// An identifier did not resolve against locals, parameters or the receiver.
    #[error("Invalid Expression: '{0}'")]
    UnresolvedName(SmolStr),

    /// Unexpected evaluator or adapter fault.
    #[error("internal evaluator error: {0}")]
    Internal(String),
}

impl EvalError {
    pub fn not_supported() -> Self {
        Self::NotSupported("Expression not supported.".to_string())
    }

    pub fn evaluation(message: impl Into<String>) -> Self {
        Self::Evaluation(message.into())
    }
}

impl From<BackendError> for EvalError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::NotSupported(op) => {
                Self::NotSupported(format!("operation '{op}' is not supported"))
            }
            other => Self::Evaluation(other.to_string()),
        }
    }
}

/// Contract violations on the value tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("value is not editable")]
    NotEditable,

    #[error("object is not an array")]
    NotAnArray,

    #[error("object is an array")]
    IsAnArray,

    #[error("array index {index} out of range (length {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("value assignment failed: {0}")]
    Assignment(#[from] EvalError),
}

/// Errors raised by breakpoint store edits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("breakpoints are read-only right now")]
    ReadOnly,

    #[error("unknown break event {0}")]
    UnknownBreakEvent(BreakEventId),
}
