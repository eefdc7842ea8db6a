// src/alert.rs
//! Single-slot alert dispatcher.
//!
//! At most one alert is Active at a time. A trigger while the slot is busy is
//! dropped (not queued, no preemption by level). The page-level breaking
//! banner is additionally gated by a per-session [`DedupMarker`].
//!
//! Every check-then-set happens under one mutex, so a timer-driven breaking
//! detection and a manual trigger can race without stacking alerts.

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::events::{EventSink, PulseEvent};
use crate::session::DedupMarker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
}

impl AlertLevel {
    /// Map the loose `type` field of an inbound notification.
    pub fn from_notification_type(kind: &str) -> Self {
        match kind.trim().to_ascii_lowercase().as_str() {
            "critical" | "error" | "breaking" => AlertLevel::Critical,
            "warning" | "warn" => AlertLevel::Warning,
            _ => AlertLevel::Info,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertStatus {
    Pending,
    Active,
    Dismissed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecord {
    pub id: String,
    pub level: AlertLevel,
    pub headline: String,
    pub created_at: DateTime<Utc>,
    pub status: AlertStatus,
}

/// What a caller wants shown; the dispatcher turns it into an [`AlertRecord`].
#[derive(Debug, Clone, PartialEq)]
pub struct AlertCandidate {
    pub level: AlertLevel,
    pub headline: String,
}

impl AlertCandidate {
    pub fn new(level: AlertLevel, headline: impl Into<String>) -> Self {
        Self {
            level,
            headline: headline.into(),
        }
    }

    pub fn critical(headline: impl Into<String>) -> Self {
        Self::new(AlertLevel::Critical, headline)
    }

    pub fn from_notification(title: &str, message: &str, kind: &str) -> Self {
        let headline = match (title.trim(), message.trim()) {
            ("", m) => m.to_string(),
            (t, "") => t.to_string(),
            (t, m) => format!("{t}: {m}"),
        };
        Self::new(AlertLevel::from_notification_type(kind), headline)
    }
}

#[derive(Debug, Default)]
struct Slot {
    active: Option<AlertRecord>,
    seq: u64,
}

pub struct AlertDispatcher {
    slot: Mutex<Slot>,
    events: Arc<dyn EventSink>,
    marker: DedupMarker,
}

impl AlertDispatcher {
    pub fn new(events: Arc<dyn EventSink>, marker: DedupMarker) -> Self {
        Self {
            slot: Mutex::new(Slot::default()),
            events,
            marker,
        }
    }

    /// Take the slot if it is free. `false` means an alert is already Active.
    pub fn trigger(&self, candidate: AlertCandidate) -> bool {
        let mut slot = self.lock();
        self.trigger_locked(&mut slot, candidate)
    }

    /// Free the slot if `id` is the Active alert. Stale ids are a no-op.
    pub fn dismiss(&self, id: &str) -> bool {
        let mut slot = self.lock();
        if !matches!(slot.active.as_ref(), Some(a) if a.id == id) {
            tracing::debug!(target: "alert", id, "dismiss ignored: not the active alert");
            return false;
        }
        let Some(mut record) = slot.active.take() else {
            return false;
        };
        record.status = AlertStatus::Dismissed;

        counter!("pulse_alerts_dismissed_total").increment(1);
        tracing::info!(target: "alert", id = %record.id, "alert dismissed");
        self.events.publish(PulseEvent::AlertDismissed { id: record.id });
        true
    }

    /// Dismiss after a display hold. The transition itself is the same as
    /// [`dismiss`](Self::dismiss); the hold is cosmetic.
    pub fn dismiss_after(self: &Arc<Self>, id: impl Into<String>, hold: Duration) -> JoinHandle<bool> {
        let this = Arc::clone(self);
        let id = id.into();
        tokio::spawn(async move {
            if !hold.is_zero() {
                tokio::time::sleep(hold).await;
            }
            this.dismiss(&id)
        })
    }

    /// Page-level breaking banner, consulted at most once per session.
    /// The marker is set after the attempt whether or not the slot was free.
    pub fn trigger_page_level(&self, headline: &str) -> bool {
        let mut slot = self.lock();
        if self.marker.is_set() {
            tracing::debug!(target: "alert", key = self.marker.key(), "page-level alert already shown this session");
            return false;
        }
        let fired = self.trigger_locked(&mut slot, AlertCandidate::critical(headline));
        self.marker.mark();
        fired
    }

    /// Inbound `notification:send`: display directly, no scoring.
    pub fn handle_notification(&self, title: &str, message: &str, kind: &str) -> bool {
        self.trigger(AlertCandidate::from_notification(title, message, kind))
    }

    pub fn active(&self) -> Option<AlertRecord> {
        self.lock().active.clone()
    }

    pub fn is_active(&self) -> bool {
        self.lock().active.is_some()
    }

    fn trigger_locked(&self, slot: &mut Slot, candidate: AlertCandidate) -> bool {
        if let Some(active) = &slot.active {
            counter!("pulse_alerts_suppressed_total").increment(1);
            tracing::debug!(
                target: "alert",
                active = %active.id,
                headline = %candidate.headline,
                "alert slot busy, candidate dropped"
            );
            return false;
        }

        slot.seq += 1;
        let now = Utc::now();
        let record = AlertRecord {
            id: alert_id(&candidate.headline, now, slot.seq),
            level: candidate.level,
            headline: candidate.headline,
            created_at: now,
            status: AlertStatus::Active,
        };

        counter!("pulse_alerts_triggered_total").increment(1);
        tracing::info!(target: "alert", id = %record.id, level = ?record.level, "alert triggered");
        self.events.publish(PulseEvent::AlertTriggered {
            id: record.id.clone(),
            level: record.level,
            headline: record.headline.clone(),
            timestamp: record.created_at,
        });
        slot.active = Some(record);
        true
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Feed `notification:send` messages from the bus into the dispatcher.
pub fn spawn_notification_listener(
    dispatcher: Arc<AlertDispatcher>,
    mut rx: broadcast::Receiver<PulseEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(PulseEvent::NotificationSend {
                    title,
                    message,
                    kind,
                }) => {
                    let shown = dispatcher.handle_notification(&title, &message, &kind);
                    tracing::debug!(target: "alert", shown, "inbound notification handled");
                }
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!(target: "alert", skipped = n, "notification listener lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn alert_id(headline: &str, at: DateTime<Utc>, seq: u64) -> String {
    use sha2::{Digest, Sha256};
    use std::fmt::Write as _;

    let mut hasher = Sha256::new();
    hasher.update(headline.as_bytes());
    hasher.update(at.timestamp_millis().to_le_bytes());
    hasher.update(seq.to_le_bytes());
    let digest = hasher.finalize();

    let mut out = String::with_capacity(18);
    out.push_str("alert-");
    for b in digest.iter().take(6) {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
