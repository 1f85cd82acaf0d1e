//! Target events and session observers.
//! - TargetEventKind/TargetEvent: backend notifications
//! - SessionEvent/EventTopic: what subscribers receive
//! - Observers: ordered subscriber list, synchronous delivery

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::breakpoints::BreakEventId;
use crate::target::{Backtrace, ProcessInfo, ThreadInfo};

/// Closed set of notifications a backend raises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetEventKind {
    ExceptionThrown,
    TargetExited,
    TargetHitBreakpoint,
    TargetInterrupted,
    TargetSignaled,
    TargetStopped,
    UnhandledException,
    TargetReady,
    ThreadStarted,
    ThreadStopped,
}

impl TargetEventKind {
    /// Events that leave the debuggee paused.
    #[must_use]
    pub fn is_stop_class(self) -> bool {
        matches!(
            self,
            Self::ExceptionThrown
                | Self::TargetHitBreakpoint
                | Self::TargetInterrupted
                | Self::TargetSignaled
                | Self::TargetStopped
                | Self::UnhandledException
        )
    }

    #[must_use]
    pub fn topic(self) -> EventTopic {
        match self {
            Self::ExceptionThrown => EventTopic::ExceptionThrown,
            Self::TargetExited => EventTopic::Exited,
            Self::TargetHitBreakpoint => EventTopic::HitBreakpoint,
            Self::TargetInterrupted => EventTopic::Interrupted,
            Self::TargetSignaled => EventTopic::Signaled,
            Self::TargetStopped => EventTopic::Stopped,
            Self::UnhandledException => EventTopic::UnhandledException,
            Self::TargetReady => EventTopic::Ready,
            Self::ThreadStarted => EventTopic::ThreadStarted,
            Self::ThreadStopped => EventTopic::ThreadStopped,
        }
    }
}

/// Backend notification payload.
#[derive(Debug, Clone)]
pub struct TargetEvent {
    pub kind: TargetEventKind,
    pub process: Option<ProcessInfo>,
    pub thread: Option<ThreadInfo>,
    pub backtrace: Option<Backtrace>,
    /// Break event that caused a `TargetHitBreakpoint`, if known.
    pub break_event: Option<BreakEventId>,
    pub signal: Option<i32>,
    pub exit_code: Option<i32>,
    /// Set by the session for stop-class events.
    pub is_stop_event: bool,
}

impl TargetEvent {
    #[must_use]
    pub fn new(kind: TargetEventKind) -> Self {
        Self {
            kind,
            process: None,
            thread: None,
            backtrace: None,
            break_event: None,
            signal: None,
            exit_code: None,
            is_stop_event: false,
        }
    }

    #[must_use]
    pub fn with_thread(mut self, thread: ThreadInfo) -> Self {
        self.thread = Some(thread);
        self
    }

    #[must_use]
    pub fn with_process(mut self, process: ProcessInfo) -> Self {
        self.process = Some(process);
        self
    }

    #[must_use]
    pub fn with_backtrace(mut self, backtrace: Backtrace) -> Self {
        self.backtrace = Some(backtrace);
        self
    }

    #[must_use]
    pub fn with_break_event(mut self, id: BreakEventId) -> Self {
        self.break_event = Some(id);
        self
    }
}

/// The debugger is busy with an evaluation it cannot abort.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BusyState {
    pub is_busy: bool,
    pub description: Option<String>,
}

/// Notification delivered to session subscribers.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A command was accepted and the target is about to run.
    TargetStarted,
    /// Typed target notification.
    Target(TargetEvent),
    /// Catch-all copy, delivered after the typed one.
    AnyTarget(TargetEvent),
    BusyStateChanged(BusyState),
}

impl SessionEvent {
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::TargetStarted => EventTopic::Started,
            Self::Target(event) => event.kind.topic(),
            Self::AnyTarget(_) => EventTopic::Any,
            Self::BusyStateChanged(_) => EventTopic::BusyState,
        }
    }

    #[must_use]
    pub fn target_event(&self) -> Option<&TargetEvent> {
        match self {
            Self::Target(event) | Self::AnyTarget(event) => Some(event),
            _ => None,
        }
    }
}

/// Subscription filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTopic {
    Started,
    Ready,
    Stopped,
    Interrupted,
    HitBreakpoint,
    Signaled,
    Exited,
    ExceptionThrown,
    UnhandledException,
    ThreadStarted,
    ThreadStopped,
    /// The catch-all target event.
    Any,
    BusyState,
}

pub type EventCallback = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    topic: Option<EventTopic>,
    callback: EventCallback,
}

/// Ordered subscriber list.
///
/// Delivery happens on the raising thread, in subscription order, with the
/// list lock released so callbacks may subscribe or unsubscribe.
#[derive(Default)]
pub struct Observers {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl Observers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, topic: EventTopic, callback: EventCallback) -> SubscriptionId {
        self.insert(Some(topic), callback)
    }

    /// Receive every session event.
    pub fn subscribe_all(&self, callback: EventCallback) -> SubscriptionId {
        self.insert(None, callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|subscriber| subscriber.id != id);
        subscribers.len() != before
    }

    pub fn emit(&self, event: &SessionEvent) {
        let topic = event.topic();
        let targets = self
            .subscribers
            .lock()
            .iter()
            .filter(|subscriber| subscriber.topic.is_none_or(|wanted| wanted == topic))
            .map(|subscriber| Arc::clone(&subscriber.callback))
            .collect::<Vec<_>>();
        for callback in targets {
            callback(event);
        }
    }

    /// Typed event first, then the catch-all.
    pub fn emit_target(&self, event: TargetEvent) {
        self.emit(&SessionEvent::Target(event.clone()));
        self.emit(&SessionEvent::AnyTarget(event));
    }

    fn insert(&self, topic: Option<EventTopic>, callback: EventCallback) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock().push(Subscriber {
            id,
            topic,
            callback,
        });
        id
    }
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("subscribers", &self.subscribers.lock().len())
            .finish()
    }
}
