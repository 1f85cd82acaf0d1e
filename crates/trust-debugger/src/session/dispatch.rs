//! Command dispatch: inline under the state lock or queued to workers.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, warn};

use super::SessionInner;
use crate::config::DispatchMode;
use crate::error::{BackendResult, SessionError, SessionResult};
use crate::events::{SessionEvent, TargetEvent, TargetEventKind};

pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

/// State restored when a command body fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Recovery {
    None,
    ForceStop,
    ForceExit,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct CommandSpec {
    pub(crate) name: &'static str,
    pub(crate) recovery: Recovery,
    /// Marks the target running and raises `TargetStarted` before dispatch.
    pub(crate) starts_target: bool,
    /// Skip the command once the session is disposed.
    pub(crate) guard_disposed: bool,
}

impl CommandSpec {
    pub(crate) const fn resuming(name: &'static str, recovery: Recovery) -> Self {
        Self {
            name,
            recovery,
            starts_target: true,
            guard_disposed: true,
        }
    }

    pub(crate) const fn plain(name: &'static str) -> Self {
        Self {
            name,
            recovery: Recovery::None,
            starts_target: false,
            guard_disposed: true,
        }
    }
}

/// FIFO job queue served by named worker threads.
///
/// Dropping the dispatcher closes the queue; workers drain what is left and
/// exit without being joined.
pub(crate) struct Dispatcher {
    sender: Option<Sender<Job>>,
    pending: Arc<(Mutex<usize>, Condvar)>,
}

impl Dispatcher {
    pub(crate) fn new(mode: DispatchMode, workers: usize) -> SessionResult<Self> {
        let pending = Arc::new((Mutex::new(0usize), Condvar::new()));
        if mode == DispatchMode::Inline {
            return Ok(Self {
                sender: None,
                pending,
            });
        }
        let (sender, receiver) = unbounded::<Job>();
        for index in 0..workers.max(1) {
            let receiver = receiver.clone();
            let pending = Arc::clone(&pending);
            thread::Builder::new()
                .name(format!("trust-debugger-dispatch-{index}"))
                .spawn(move || {
                    for job in receiver.iter() {
                        if let Err(panic) = catch_unwind(AssertUnwindSafe(job)) {
                            error!(message = %panic_message(panic.as_ref()), "dispatch job panicked");
                        }
                        let (count, idle) = &*pending;
                        let mut count = count.lock();
                        *count = count.saturating_sub(1);
                        if *count == 0 {
                            idle.notify_all();
                        }
                    }
                })
                .map_err(|err| SessionError::ThreadSpawn(err.to_string().into()))?;
        }
        Ok(Self {
            sender: Some(sender),
            pending,
        })
    }

    pub(crate) fn is_inline(&self) -> bool {
        self.sender.is_none()
    }

    /// Queue `job`; hands it back when there is no live worker queue.
    pub(crate) fn submit(&self, job: Job) -> Result<(), Job> {
        let Some(sender) = self.sender.as_ref() else {
            return Err(job);
        };
        *self.pending.0.lock() += 1;
        sender.send(job).map_err(|failed| {
            let mut count = self.pending.0.lock();
            *count = count.saturating_sub(1);
            failed.into_inner()
        })
    }

    /// Block until every queued job has finished or `timeout` elapses.
    pub(crate) fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let (count, idle) = &*self.pending;
        let mut count = count.lock();
        while *count > 0 {
            if idle.wait_until(&mut count, deadline).timed_out() {
                return *count == 0;
            }
        }
        true
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(text) = panic.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = panic.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}

type CommandBody = Box<dyn FnOnce(&Arc<SessionInner>) -> BackendResult<()> + Send + 'static>;

impl SessionInner {
    /// Accept a command under the state lock, then run or queue its body.
    pub(crate) fn command(
        self: &Arc<Self>,
        spec: CommandSpec,
        body: impl FnOnce(&Arc<SessionInner>) -> BackendResult<()> + Send + 'static,
    ) -> SessionResult<()> {
        let guard = self.state.lock();
        if spec.guard_disposed && guard.borrow().disposed {
            debug!(command = spec.name, "ignored on disposed session");
            return Ok(());
        }
        if spec.starts_target {
            self.on_running();
        }
        let body: CommandBody = Box::new(body);
        if self.dispatcher.is_inline() {
            debug!(command = spec.name, "running inline");
            return self.execute(spec, body);
        }
        let inner = Arc::clone(self);
        let job: Job = Box::new(move || {
            let outcome = catch_unwind(AssertUnwindSafe(|| inner.execute(spec, body)));
            let err = match outcome {
                Ok(Ok(())) => return,
                Ok(Err(err)) => err,
                Err(panic) => SessionError::WorkerPanicked {
                    command: spec.name,
                    message: panic_message(panic.as_ref()),
                },
            };
            error!(command = spec.name, %err, "unhandled command failure");
            inner.faults.lock().push(err);
        });
        debug!(command = spec.name, "queued");
        if let Err(job) = self.dispatcher.submit(job) {
            warn!(command = spec.name, "dispatch queue closed, running inline");
            job();
        }
        drop(guard);
        Ok(())
    }

    /// Run a command body under the state lock with failure recovery.
    fn execute(self: &Arc<Self>, spec: CommandSpec, body: CommandBody) -> SessionResult<()> {
        let _guard = self.state.lock();
        let Err(source) = body(self) else {
            return Ok(());
        };
        warn!(command = spec.name, error = %source, "backend command failed");
        let err = SessionError::command(spec.name, source);
        match spec.recovery {
            Recovery::None => {}
            Recovery::ForceStop => self.on_target_event(TargetEvent::new(TargetEventKind::TargetStopped)),
            Recovery::ForceExit => self.on_target_event(TargetEvent::new(TargetEventKind::TargetExited)),
        }
        if self.handle_exception(&err) {
            return Ok(());
        }
        Err(err)
    }

    /// Record the running transition and announce it.
    pub(crate) fn on_running(&self) {
        let guard = self.state.lock();
        guard.borrow_mut().exited = false;
        self.running.store(true, Ordering::SeqCst);
        self.observers.emit(&SessionEvent::TargetStarted);
    }
}
