//! Session configuration loading.
//! - SessionConfig: construction-time knobs (dispatch, auto-rebind, evaluation)
//! - DebuggerSessionOptions: per run/attach options
//! - TOML + environment loading

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::SessionError;
use crate::value::EvaluationOptions;

pub const DEFAULT_ARRAY_FETCH_CHUNK: usize = 50;
pub const DEFAULT_READ_ONLY_CHECK_TIMEOUT: Duration = Duration::from_millis(10);
pub const DEFAULT_CHILD_TIMEOUT: Duration = Duration::from_millis(1000);

const ENV_INLINE_DISPATCH: &str = "TRUST_DEBUGGER_INLINE_DISPATCH";
const ENV_AUTO_RETRY: &str = "TRUST_DEBUGGER_AUTO_RETRY";

/// How command bodies reach the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// Run the body on the calling thread under the state lock.
    Inline,
    /// Queue the body to a worker which takes the state lock itself.
    #[default]
    Worker,
}

impl DispatchMode {
    fn parse(text: &str) -> Result<Self, SessionError> {
        match text.trim().to_ascii_lowercase().as_str() {
            "inline" | "sync" => Ok(Self::Inline),
            "worker" | "thread" => Ok(Self::Worker),
            _ => Err(SessionError::InvalidConfig(
                format!("invalid dispatch.mode '{text}'").into(),
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub dispatch: DispatchMode,
    /// Worker threads used when `dispatch` is `Worker`. Commands stay FIFO only with one worker.
    pub workers: usize,
    /// Retry unbound file breakpoints when the backend reports a source load.
    pub auto_retry_unbound: bool,
    /// Upper bound on the state-lock wait of the store read-only hook.
    pub read_only_check_timeout: Duration,
    /// Evaluation defaults copied into each run's options.
    pub evaluation: EvaluationOptions,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dispatch: DispatchMode::Worker,
            workers: 1,
            auto_retry_unbound: false,
            read_only_check_timeout: DEFAULT_READ_ONLY_CHECK_TIMEOUT,
            evaluation: EvaluationOptions::default(),
        }
    }
}

impl SessionConfig {
    /// Inline dispatch; handy for front ends that already run on a worker.
    #[must_use]
    pub fn inline() -> Self {
        Self {
            dispatch: DispatchMode::Inline,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_auto_retry(mut self, enabled: bool) -> Self {
        self.auto_retry_unbound = enabled;
        self
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|err| SessionError::InvalidConfig(format!("debugger.toml: {err}").into()))?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, SessionError> {
        let raw: DebuggerToml = toml::from_str(text)
            .map_err(|err| SessionError::InvalidConfig(format!("debugger.toml: {err}").into()))?;
        raw.into_config()
    }

    /// Apply `TRUST_DEBUGGER_*` flags on top of the loaded values.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(inline) = env_flag(ENV_INLINE_DISPATCH) {
            self.dispatch = if inline {
                DispatchMode::Inline
            } else {
                DispatchMode::Worker
            };
        }
        if let Some(retry) = env_flag(ENV_AUTO_RETRY) {
            self.auto_retry_unbound = retry;
        }
        self
    }
}

/// Stepping policy handed to the backend with each run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SteppingOptions {
    pub step_over_properties_and_operators: bool,
    pub project_code_only: bool,
}

impl Default for SteppingOptions {
    fn default() -> Self {
        Self {
            step_over_properties_and_operators: true,
            project_code_only: true,
        }
    }
}

/// Options supplied to `run`/`attach_to_process`.
#[derive(Debug, Clone, Default)]
pub struct DebuggerSessionOptions {
    pub evaluation: EvaluationOptions,
    pub stepping: SteppingOptions,
}

#[derive(Debug, Deserialize)]
struct DebuggerToml {
    dispatch: Option<DispatchSection>,
    breakpoints: Option<BreakpointSection>,
    evaluation: Option<EvaluationSection>,
}

#[derive(Debug, Deserialize)]
struct DispatchSection {
    mode: Option<String>,
    workers: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct BreakpointSection {
    auto_retry_unbound: Option<bool>,
    read_only_check_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct EvaluationSection {
    array_fetch_chunk: Option<usize>,
    child_timeout_ms: Option<u64>,
    allow_method_evaluation: Option<bool>,
    allow_to_string_calls: Option<bool>,
}

impl DebuggerToml {
    fn into_config(self) -> Result<SessionConfig, SessionError> {
        let mut config = SessionConfig::default();
        if let Some(dispatch) = self.dispatch {
            if let Some(mode) = dispatch.mode.as_deref() {
                config.dispatch = DispatchMode::parse(mode)?;
            }
            if let Some(workers) = dispatch.workers {
                if workers == 0 {
                    return Err(SessionError::InvalidConfig(
                        "dispatch.workers must be at least 1".into(),
                    ));
                }
                config.workers = workers;
            }
        }
        if let Some(breakpoints) = self.breakpoints {
            if let Some(retry) = breakpoints.auto_retry_unbound {
                config.auto_retry_unbound = retry;
            }
            if let Some(timeout) = breakpoints.read_only_check_timeout_ms {
                config.read_only_check_timeout = Duration::from_millis(timeout);
            }
        }
        if let Some(evaluation) = self.evaluation {
            if let Some(chunk) = evaluation.array_fetch_chunk {
                if chunk == 0 {
                    return Err(SessionError::InvalidConfig(
                        "evaluation.array_fetch_chunk must be at least 1".into(),
                    ));
                }
                config.evaluation.array_fetch_chunk = chunk;
            }
            if let Some(timeout) = evaluation.child_timeout_ms {
                config.evaluation.child_timeout = Duration::from_millis(timeout);
            }
            if let Some(allow) = evaluation.allow_method_evaluation {
                config.evaluation.allow_method_evaluation = allow;
            }
            if let Some(allow) = evaluation.allow_to_string_calls {
                config.evaluation.allow_to_string_calls = allow;
            }
        }
        Ok(config)
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let raw = std::env::var(name).ok()?;
    let value = raw.trim().to_ascii_lowercase();
    Some(matches!(value.as_str(), "1" | "true" | "yes" | "on"))
}
