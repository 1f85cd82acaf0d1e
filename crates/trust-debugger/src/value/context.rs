use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::config::{DEFAULT_ARRAY_FETCH_CHUNK, DEFAULT_CHILD_TIMEOUT};
use crate::output::OutputRouter;

use super::adapter::{ObjectValueAdapter, TargetType, TargetValue};
use super::evaluator::ExpressionEvaluator;

/// Evaluation policy for inspection requests.
#[derive(Debug, Clone)]
pub struct EvaluationOptions {
    /// Allow property getters and method calls during evaluation.
    pub allow_method_evaluation: bool,
    /// Otherwise `call_to_string` renders `{TypeName}`.
    pub allow_to_string_calls: bool,
    /// Array elements fetched past the requested index.
    pub array_fetch_chunk: usize,
    pub child_timeout: Duration,
    /// Type an assigned value is cast to.
    pub expected_type: Option<TargetType>,
}

impl Default for EvaluationOptions {
    fn default() -> Self {
        Self {
            allow_method_evaluation: true,
            allow_to_string_calls: true,
            array_fetch_chunk: DEFAULT_ARRAY_FETCH_CHUNK,
            child_timeout: DEFAULT_CHILD_TIMEOUT,
            expected_type: None,
        }
    }
}

/// Everything an evaluation needs: adapter, evaluator, frame scope and sinks.
///
/// Cheap to clone; owns the backend resources value references point into.
#[derive(Clone)]
pub struct EvaluationContext {
    pub adapter: Arc<dyn ObjectValueAdapter>,
    pub evaluator: Arc<dyn ExpressionEvaluator>,
    /// Backend frame handle the adapter resolves names against.
    pub scope: TargetValue,
    pub options: EvaluationOptions,
    /// How long `object_value` waits before returning an `Evaluating`
    /// placeholder. Zero evaluates on the calling thread.
    pub timeout: Duration,
    pub output: OutputRouter,
}

impl EvaluationContext {
    #[must_use]
    pub fn new(
        adapter: Arc<dyn ObjectValueAdapter>,
        evaluator: Arc<dyn ExpressionEvaluator>,
        scope: TargetValue,
        options: EvaluationOptions,
    ) -> Self {
        let timeout = options.child_timeout;
        Self {
            adapter,
            evaluator,
            scope,
            options,
            timeout,
            output: OutputRouter::new(),
        }
    }

    #[must_use]
    pub fn with_output(mut self, output: OutputRouter) -> Self {
        self.output = output;
        self
    }

    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let mut ctx = self.clone();
        ctx.timeout = timeout;
        ctx
    }

    /// Context used to enumerate children, with the adapter's child timeout.
    #[must_use]
    pub fn child_context(&self) -> Self {
        self.with_timeout(self.adapter.default_child_evaluation_timeout())
    }

    pub fn write_debugger_output(&self, text: &str) {
        self.output.debugger_output(false, text);
    }

    pub fn write_debugger_error(&self, error: &dyn std::error::Error) {
        warn!(%error, "evaluation fault");
        self.output.debugger_output(true, &format!("{error}\n"));
    }
}

impl fmt::Debug for EvaluationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluationContext")
            .field("options", &self.options)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
