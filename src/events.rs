// src/events.rs
//! Typed publish/subscribe bus between the core and presentation widgets.
//!
//! The event set is closed: presentation code matches on [`PulseEvent`]
//! instead of string names. `name()` still exposes the wire name
//! (`alert:triggered`, ...) for collaborators that need it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;

use crate::alert::AlertLevel;

pub const DEFAULT_BUS_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum PulseEvent {
    #[serde(rename = "breaking:detected", rename_all = "camelCase")]
    BreakingDetected {
        item_id: String,
        headline: String,
        detected_at: DateTime<Utc>,
    },
    #[serde(rename = "alert:triggered", rename_all = "camelCase")]
    AlertTriggered {
        id: String,
        level: AlertLevel,
        headline: String,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "alert:dismissed")]
    AlertDismissed { id: String },
    #[serde(rename = "sync:complete")]
    SyncComplete {
        channel: String,
        timestamp: DateTime<Utc>,
    },
    /// Inbound only: presentation asks the dispatcher to show a message.
    #[serde(rename = "notification:send")]
    NotificationSend {
        title: String,
        message: String,
        #[serde(rename = "type")]
        kind: String,
    },
}

impl PulseEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PulseEvent::BreakingDetected { .. } => "breaking:detected",
            PulseEvent::AlertTriggered { .. } => "alert:triggered",
            PulseEvent::AlertDismissed { .. } => "alert:dismissed",
            PulseEvent::SyncComplete { .. } => "sync:complete",
            PulseEvent::NotificationSend { .. } => "notification:send",
        }
    }
}

/// Anything the core can emit domain events into.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: PulseEvent);
}

/// Broadcast-backed bus. Publishing never blocks; slow subscribers lag.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PulseEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PulseEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

impl EventSink for EventBus {
    fn publish(&self, event: PulseEvent) {
        let name = event.name();
        // Err only means nobody is listening right now.
        if self.tx.send(event).is_err() {
            tracing::trace!(target: "events", event = name, "no subscribers");
        }
    }
}

/// In-memory sink that keeps every published event, for tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<PulseEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<PulseEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.snapshot().iter().map(PulseEvent::name).collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.names().into_iter().filter(|n| *n == name).count()
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, event: PulseEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
