//! In-process event bus.
//!
//! Synchronous publish/subscribe. Every published event is wrapped in an
//! [`EventEnvelope`], handed to the handlers subscribed to its name and kept
//! in a bounded ring for debugging.

use std::collections::VecDeque;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::{Arc, Mutex, Weak};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::traits::{Clock, SystemClock};

/// Default number of envelopes kept in the ring.
pub const DEFAULT_LOG_CAPACITY: usize = 1_000;

/// Envelope schema version.
pub const ENVELOPE_VERSION: u32 = 1;

/// Names of the events the core publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventName {
    #[serde(rename = "quiz.attempt.save")]
    AttemptSaved,
    #[serde(rename = "quiz.attempt.pending")]
    AttemptPending,
    #[serde(rename = "quiz.attempt.pruned")]
    AttemptsPruned,
    #[serde(rename = "quiz.submit")]
    QuizSubmitted,
    #[serde(rename = "quiz.scoring.error")]
    ScoringError,
    #[serde(rename = "i18n.missing_key")]
    MissingTranslation,
    #[serde(rename = "storage.read_error")]
    StorageReadError,
}

impl EventName {
    pub const ALL: [EventName; 7] = [
        EventName::AttemptSaved,
        EventName::AttemptPending,
        EventName::AttemptsPruned,
        EventName::QuizSubmitted,
        EventName::ScoringError,
        EventName::MissingTranslation,
        EventName::StorageReadError,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventName::AttemptSaved => "quiz.attempt.save",
            EventName::AttemptPending => "quiz.attempt.pending",
            EventName::AttemptsPruned => "quiz.attempt.pruned",
            EventName::QuizSubmitted => "quiz.submit",
            EventName::ScoringError => "quiz.scoring.error",
            EventName::MissingTranslation => "i18n.missing_key",
            EventName::StorageReadError => "storage.read_error",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| format!("unknown event name: {s}"))
    }
}

/// A published event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: Uuid,
    pub name: EventName,
    pub ts: DateTime<Utc>,
    pub payload: Value,
    pub version: u32,
}

type Handler = Arc<dyn Fn(&EventEnvelope) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: Vec<(u64, EventName, Handler)>,
}

/// Handle returned by [`EventBus::subscribe`].
///
/// Dropping it keeps the handler registered; call [`Subscription::unsubscribe`]
/// to remove it.
#[must_use = "keep the subscription to be able to unsubscribe"]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Remove the handler. Returns `false` if it was already gone.
    pub fn unsubscribe(self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let mut registry = registry.lock().unwrap_or_else(|e| e.into_inner());
        let before = registry.handlers.len();
        registry.handlers.retain(|(id, _, _)| *id != self.id);
        registry.handlers.len() != before
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// Synchronous event bus with a bounded event log.
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
    log: Mutex<VecDeque<EventEnvelope>>,
    capacity: usize,
    clock: Arc<dyn Clock>,
}

impl EventBus {
    /// Create a bus keeping at most `capacity` envelopes (at least 1).
    pub fn new(capacity: usize) -> Self {
        Self::with_clock(capacity, Arc::new(SystemClock))
    }

    /// Create a bus stamping envelopes with `clock`.
    pub fn with_clock(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        let capacity = capacity.max(1);
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            log: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_LOG_CAPACITY))),
            capacity,
            clock,
        }
    }

    /// Register `handler` for events named `name`.
    pub fn subscribe<F>(&self, name: EventName, handler: F) -> Subscription
    where
        F: Fn(&EventEnvelope) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        let id = registry.next_id;
        registry.next_id += 1;
        registry.handlers.push((id, name, Arc::new(handler)));
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Publish an event and dispatch it to its subscribers.
    ///
    /// Handlers run in subscription order, outside any bus lock, so they may
    /// publish or subscribe themselves. A panicking handler is logged and
    /// skipped.
    pub fn publish(&self, name: EventName, payload: Value) -> EventEnvelope {
        let envelope = EventEnvelope {
            id: Uuid::new_v4(),
            name,
            ts: self.clock.now(),
            payload,
            version: ENVELOPE_VERSION,
        };

        {
            let mut log = self.log.lock().unwrap_or_else(|e| e.into_inner());
            while log.len() >= self.capacity {
                log.pop_front();
            }
            log.push_back(envelope.clone());
        }

        let handlers: Vec<Handler> = {
            let registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
            registry
                .handlers
                .iter()
                .filter(|(_, n, _)| *n == name)
                .map(|(_, _, h)| Arc::clone(h))
                .collect()
        };

        tracing::debug!(event = %name, id = %envelope.id, subscribers = handlers.len(), "publish");

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(&envelope))).is_err() {
                tracing::error!(event = %name, id = %envelope.id, "event handler panicked");
            }
        }

        envelope
    }

    /// The newest `limit` envelopes, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<EventEnvelope> {
        let log = self.log.lock().unwrap_or_else(|e| e.into_inner());
        let skip = log.len().saturating_sub(limit);
        log.iter().skip(skip).cloned().collect()
    }

    /// Logged envelopes named `name`, oldest first.
    pub fn events_named(&self, name: EventName) -> Vec<EventEnvelope> {
        let log = self.log.lock().unwrap_or_else(|e| e.into_inner());
        log.iter().filter(|e| e.name == name).cloned().collect()
    }

    /// Number of envelopes currently logged.
    pub fn len(&self) -> usize {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("capacity", &self.capacity)
            .field("logged", &self.len())
            .finish()
    }
}
