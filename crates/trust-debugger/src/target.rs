//! Debuggee-side objects handed out by the session.
//! - SourceLocation/StartInfo/AssemblyLine: plain data
//! - ProcessInfo/ThreadInfo/Backtrace: carry a session back-reference
//! - StackFrame: delegates inspection to the backend backtrace

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;
use smol_str::SmolStr;

use crate::error::{BackendResult, SessionError, SessionResult};
use crate::session::{DebuggerSession, SessionLink};
use crate::value::{CompletionData, EvaluationContext, EvaluationOptions, ObjectValue};

/// Resolved source position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SourceLocation {
    pub method: SmolStr,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl SourceLocation {
    #[must_use]
    pub fn new(method: impl Into<SmolStr>, file: impl Into<String>, line: u32) -> Self {
        Self {
            method: method.into(),
            file: Some(file.into()),
            line: Some(line),
            column: None,
        }
    }

    #[must_use]
    pub fn with_column(mut self, column: u32) -> Self {
        self.column = Some(column);
        self
    }

    /// File extension including the dot, e.g. `.cs`.
    #[must_use]
    pub fn file_extension(&self) -> Option<String> {
        let file = self.file.as_deref()?;
        let ext = std::path::Path::new(file).extension()?.to_str()?;
        Some(format!(".{ext}"))
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let file = self.file.as_deref().unwrap_or("<unknown>");
        write!(f, "{file}")?;
        if let Some(line) = self.line {
            write!(f, ":{line}")?;
            if let Some(column) = self.column {
                write!(f, ":{column}")?;
            }
        }
        if !self.method.is_empty() {
            write!(f, " ({})", self.method)?;
        }
        Ok(())
    }
}

/// Launch request for `DebuggerSession::run`.
#[derive(Debug, Clone, Default)]
pub struct StartInfo {
    pub command: String,
    pub arguments: Vec<String>,
    pub working_directory: Option<PathBuf>,
    pub environment: IndexMap<String, String>,
}

impl StartInfo {
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }
}

/// One disassembled instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyLine {
    pub address: u64,
    pub code: String,
    pub source_line: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ProcessInfo {
    pub id: u64,
    pub name: SmolStr,
    session: SessionLink,
}

impl ProcessInfo {
    #[must_use]
    pub fn new(id: u64, name: impl Into<SmolStr>) -> Self {
        Self {
            id,
            name: name.into(),
            session: SessionLink::default(),
        }
    }

    pub(crate) fn attach(&mut self, session: &SessionLink) {
        self.session = session.clone();
    }

    #[must_use]
    pub fn session(&self) -> Option<DebuggerSession> {
        self.session.upgrade()
    }

    pub fn threads(&self) -> SessionResult<Vec<ThreadInfo>> {
        let session = self.session.upgrade().ok_or(SessionError::Detached)?;
        session.threads(self.id)
    }
}

#[derive(Debug, Clone)]
pub struct ThreadInfo {
    pub process_id: u64,
    pub id: u64,
    pub name: SmolStr,
    /// Short description of where the thread is, as reported by the backend.
    pub location: Option<String>,
    session: SessionLink,
}

impl ThreadInfo {
    #[must_use]
    pub fn new(process_id: u64, id: u64, name: impl Into<SmolStr>) -> Self {
        Self {
            process_id,
            id,
            name: name.into(),
            location: None,
            session: SessionLink::default(),
        }
    }

    pub(crate) fn attach(&mut self, session: &SessionLink) {
        self.session = session.clone();
    }

    #[must_use]
    pub fn session(&self) -> Option<DebuggerSession> {
        self.session.upgrade()
    }

    pub fn backtrace(&self) -> SessionResult<Option<Backtrace>> {
        let session = self.session.upgrade().ok_or(SessionError::Detached)?;
        session.backtrace(self.process_id, self.id)
    }
}

impl PartialEq for ThreadInfo {
    fn eq(&self, other: &Self) -> bool {
        self.process_id == other.process_id && self.id == other.id
    }
}

impl Eq for ThreadInfo {}

/// Frame description produced by a backend backtrace.
#[derive(Debug, Clone)]
pub struct FrameInfo {
    pub address: u64,
    pub location: SourceLocation,
    pub language: SmolStr,
}

/// Backend-side stack walk for one thread.
///
/// Value producers never fail: evaluation problems come back as error,
/// unsupported or unknown nodes.
pub trait BacktraceSource: Send + Sync {
    fn frame_count(&self) -> usize;

    fn frame(&self, index: usize) -> BackendResult<FrameInfo>;

    fn local_variables(&self, frame: usize, options: &EvaluationOptions) -> Vec<ObjectValue>;

    fn parameters(&self, frame: usize, options: &EvaluationOptions) -> Vec<ObjectValue>;

    fn all_locals(&self, frame: usize, options: &EvaluationOptions) -> Vec<ObjectValue> {
        let mut values = self.parameters(frame, options);
        values.extend(self.local_variables(frame, options));
        values
    }

    fn this_reference(&self, frame: usize, options: &EvaluationOptions) -> Option<ObjectValue>;

    fn expression_values(
        &self,
        frame: usize,
        expressions: &[String],
        options: &EvaluationOptions,
    ) -> Vec<ObjectValue>;

    /// Context for evaluating in `frame`; `None` when the backend cannot evaluate there.
    fn evaluation_context(
        &self,
        _frame: usize,
        _options: &EvaluationOptions,
    ) -> Option<EvaluationContext> {
        None
    }

    /// `first_line` is relative to the frame's current line and may be negative.
    fn disassemble(&self, _frame: usize, _first_line: i32, _count: usize) -> Vec<AssemblyLine> {
        Vec::new()
    }
}

#[derive(Clone)]
pub struct Backtrace {
    source: Arc<dyn BacktraceSource>,
    session: SessionLink,
}

impl Backtrace {
    #[must_use]
    pub fn new(source: Arc<dyn BacktraceSource>) -> Self {
        Self {
            source,
            session: SessionLink::default(),
        }
    }

    pub(crate) fn attach(&mut self, session: &SessionLink) {
        self.session = session.clone();
    }

    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.source.frame_count()
    }

    pub fn frame(&self, index: usize) -> SessionResult<StackFrame> {
        let info = self
            .source
            .frame(index)
            .map_err(|err| SessionError::command("frame", err))?;
        let options = self
            .session
            .upgrade()
            .map(|session| session.evaluation_options())
            .unwrap_or_default();
        Ok(StackFrame {
            address: info.address,
            location: info.location,
            language: info.language,
            index,
            options,
            backtrace: Arc::clone(&self.source),
            session: self.session.clone(),
        })
    }

    pub fn frames(&self) -> SessionResult<Vec<StackFrame>> {
        (0..self.frame_count()).map(|index| self.frame(index)).collect()
    }
}

impl fmt::Debug for Backtrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backtrace")
            .field("frames", &self.source.frame_count())
            .finish_non_exhaustive()
    }
}

/// Read-only view of one frame; queries go through the owning backtrace.
///
/// Session evaluation options are captured when the frame is built.
#[derive(Clone)]
pub struct StackFrame {
    address: u64,
    location: SourceLocation,
    language: SmolStr,
    index: usize,
    options: EvaluationOptions,
    backtrace: Arc<dyn BacktraceSource>,
    session: SessionLink,
}

impl StackFrame {
    #[must_use]
    pub fn address(&self) -> u64 {
        self.address
    }

    #[must_use]
    pub fn location(&self) -> &SourceLocation {
        &self.location
    }

    #[must_use]
    pub fn language(&self) -> &str {
        &self.language
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn session(&self) -> Option<DebuggerSession> {
        self.session.upgrade()
    }

    #[must_use]
    pub fn evaluation_options(&self) -> &EvaluationOptions {
        &self.options
    }

    #[must_use]
    pub fn local_variables(&self) -> Vec<ObjectValue> {
        self.local_variables_with(&self.options)
    }

    #[must_use]
    pub fn local_variables_with(&self, options: &EvaluationOptions) -> Vec<ObjectValue> {
        self.backtrace.local_variables(self.index, options)
    }

    #[must_use]
    pub fn parameters(&self) -> Vec<ObjectValue> {
        self.parameters_with(&self.options)
    }

    #[must_use]
    pub fn parameters_with(&self, options: &EvaluationOptions) -> Vec<ObjectValue> {
        self.backtrace.parameters(self.index, options)
    }

    #[must_use]
    pub fn all_locals(&self) -> Vec<ObjectValue> {
        self.all_locals_with(&self.options)
    }

    #[must_use]
    pub fn all_locals_with(&self, options: &EvaluationOptions) -> Vec<ObjectValue> {
        self.backtrace.all_locals(self.index, options)
    }

    #[must_use]
    pub fn this_reference(&self) -> Option<ObjectValue> {
        self.this_reference_with(&self.options)
    }

    #[must_use]
    pub fn this_reference_with(&self, options: &EvaluationOptions) -> Option<ObjectValue> {
        self.backtrace.this_reference(self.index, options)
    }

    #[must_use]
    pub fn expression_values(
        &self,
        expressions: &[String],
        evaluate_methods: bool,
    ) -> Vec<ObjectValue> {
        let mut options = self.options.clone();
        options.allow_method_evaluation = evaluate_methods;
        self.expression_values_with(expressions, &options)
    }

    #[must_use]
    pub fn expression_values_with(
        &self,
        expressions: &[String],
        options: &EvaluationOptions,
    ) -> Vec<ObjectValue> {
        self.backtrace
            .expression_values(self.index, expressions, options)
    }

    #[must_use]
    pub fn expression_value(&self, expression: &str, evaluate_methods: bool) -> ObjectValue {
        let expressions = [expression.to_string()];
        self.expression_values(&expressions, evaluate_methods)
            .into_iter()
            .next()
            .unwrap_or_else(|| ObjectValue::unknown(expression))
    }

    /// Completion candidates for a partially typed expression, from the
    /// evaluator registered for this frame's source language.
    #[must_use]
    pub fn expression_completion_data(&self, expression: &str) -> Option<CompletionData> {
        let ctx = self.backtrace.evaluation_context(self.index, &self.options)?;
        let evaluator = self
            .session
            .upgrade()
            .map_or_else(|| Arc::clone(&ctx.evaluator), |session| session.evaluator(self));
        evaluator.completion_data(&ctx, expression)
    }

    #[must_use]
    pub fn disassemble(&self, first_line: i32, count: usize) -> Vec<AssemblyLine> {
        self.backtrace.disassemble(self.index, first_line, count)
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:X} in {}", self.address, self.location.method)?;
        match (self.location.file.as_deref(), self.location.line) {
            (Some(file), Some(line)) if !file.is_empty() => write!(f, " at {file}:{line}"),
            (Some(file), None) if !file.is_empty() => write!(f, " at {file}"),
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackFrame")
            .field("address", &self.address)
            .field("location", &self.location)
            .field("language", &self.language)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}
