//! Debuggee output and debugger log routing.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

/// Sink callback: `(is_stderr, text)`.
pub type OutputWriter = Arc<dyn Fn(bool, &str) + Send + Sync>;

/// Two independent sinks, each behind its own lock.
///
/// Writes with no registered sink are dropped. Nothing is buffered.
#[derive(Clone, Default)]
pub struct OutputRouter {
    sinks: Arc<Sinks>,
}

#[derive(Default)]
struct Sinks {
    target: Mutex<Option<OutputWriter>>,
    log: Mutex<Option<OutputWriter>>,
}

impl OutputRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_output_writer(&self, writer: Option<OutputWriter>) {
        *self.sinks.target.lock() = writer;
    }

    pub fn set_log_writer(&self, writer: Option<OutputWriter>) {
        *self.sinks.log.lock() = writer;
    }

    #[must_use]
    pub fn has_log_writer(&self) -> bool {
        self.sinks.log.lock().is_some()
    }

    /// Forward debuggee output.
    pub fn target_output(&self, is_stderr: bool, text: &str) {
        let sink = self.sinks.target.lock();
        if let Some(writer) = sink.as_ref() {
            writer(is_stderr, text);
        }
    }

    /// Forward a debugger log message.
    pub fn debugger_output(&self, is_stderr: bool, text: &str) {
        let sink = self.sinks.log.lock();
        if let Some(writer) = sink.as_ref() {
            writer(is_stderr, text);
        }
    }
}

impl fmt::Debug for OutputRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputRouter")
            .field("target", &self.sinks.target.lock().is_some())
            .field("log", &self.sinks.log.lock().is_some())
            .finish()
    }
}
