// src/scheduler.rs
//! Channel scheduler: one independent periodic task per named channel.
//!
//! Per tick: run the handler, advance the channel's `last_sync`, emit
//! `sync:complete`. Handler errors and panics stop at this boundary; the
//! channel keeps ticking and no other channel notices. Ticks of one channel
//! never overlap; channels interleave freely.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::events::{EventSink, PulseEvent};

const MIN_INTERVAL: Duration = Duration::from_millis(1);

#[async_trait]
pub trait ChannelHandler: Send + Sync {
    async fn refresh(&self, channel: &str) -> Result<()>;
}

#[derive(Clone)]
pub struct ChannelSpec {
    pub name: String,
    pub interval: Duration,
    pub handler: Arc<dyn ChannelHandler>,
}

impl ChannelSpec {
    pub fn new(name: impl Into<String>, interval: Duration, handler: Arc<dyn ChannelHandler>) -> Self {
        Self {
            name: name.into(),
            interval,
            handler,
        }
    }
}

/// Sync bookkeeping for one channel; written only by that channel's task.
#[derive(Debug, Default)]
pub struct ChannelClock {
    last_sync: Mutex<Option<DateTime<Utc>>>,
    syncs: AtomicU64,
    failures: AtomicU64,
}

impl ChannelClock {
    /// Record a completed sync. Never moves backwards, even if the wall clock does.
    fn advance(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let mut last = self.last_sync.lock().unwrap_or_else(PoisonError::into_inner);
        let next = match *last {
            Some(prev) if prev > at => prev,
            _ => at,
        };
        *last = Some(next);
        self.syncs.fetch_add(1, Ordering::Relaxed);
        next
    }

    fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        *self.last_sync.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSync {
    pub channel: String,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub syncs: u64,
    pub failures: u64,
}

/// Read-only view over every channel's clock.
#[derive(Debug, Clone, Default)]
pub struct SyncLedger {
    clocks: Arc<BTreeMap<String, Arc<ChannelClock>>>,
}

impl SyncLedger {
    pub fn last_sync(&self, channel: &str) -> Option<DateTime<Utc>> {
        self.clocks.get(channel).and_then(|c| c.last_sync())
    }

    pub fn snapshot(&self) -> Vec<ChannelSync> {
        self.clocks
            .iter()
            .map(|(name, c)| ChannelSync {
                channel: name.clone(),
                last_sync_at: c.last_sync(),
                syncs: c.syncs.load(Ordering::Relaxed),
                failures: c.failures.load(Ordering::Relaxed),
            })
            .collect()
    }
}

pub struct ChannelScheduler {
    channels: Vec<ChannelSpec>,
    events: Arc<dyn EventSink>,
}

impl ChannelScheduler {
    pub fn new(events: Arc<dyn EventSink>) -> Self {
        Self {
            channels: Vec::new(),
            events,
        }
    }

    pub fn with_channel(mut self, spec: ChannelSpec) -> Self {
        self.add_channel(spec);
        self
    }

    /// Duplicate names are ignored (first registration wins).
    pub fn add_channel(&mut self, spec: ChannelSpec) {
        if self.channels.iter().any(|c| c.name == spec.name) {
            tracing::warn!(target: "scheduler", channel = %spec.name, "duplicate channel ignored");
            return;
        }
        self.channels.push(spec);
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name.as_str()).collect()
    }

    /// Spawn one task per channel. Must be called inside a tokio runtime.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown, _) = watch::channel(false);

        let mut clocks = BTreeMap::new();
        let mut tasks = Vec::with_capacity(self.channels.len());
        for spec in self.channels {
            let clock = Arc::new(ChannelClock::default());
            clocks.insert(spec.name.clone(), Arc::clone(&clock));
            tracing::info!(
                target: "scheduler",
                channel = %spec.name,
                interval_ms = spec.interval.as_millis() as u64,
                "channel started"
            );
            tasks.push(tokio::spawn(run_channel(
                spec,
                clock,
                Arc::clone(&self.events),
                shutdown.subscribe(),
            )));
        }

        SchedulerHandle {
            shutdown,
            tasks,
            ledger: SyncLedger {
                clocks: Arc::new(clocks),
            },
        }
    }
}

/// Running scheduler. Dropping it without `stop()` also ends the channel
/// tasks at their next tick.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    ledger: SyncLedger,
}

impl SchedulerHandle {
    pub fn ledger(&self) -> SyncLedger {
        self.ledger.clone()
    }

    /// Signal every channel and wait for them. An in-flight handler runs to
    /// completion; its result is discarded.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        for t in self.tasks {
            if let Err(e) = t.await {
                tracing::warn!(target: "scheduler", error = ?e, "channel task ended abnormally");
            }
        }
        tracing::info!(target: "scheduler", "scheduler stopped");
    }
}

async fn run_channel(
    spec: ChannelSpec,
    clock: Arc<ChannelClock>,
    events: Arc<dyn EventSink>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = time::interval(spec.interval.max(MIN_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }
        if *shutdown.borrow() {
            break;
        }

        // Own task so a panicking handler surfaces as a JoinError here.
        let handler = Arc::clone(&spec.handler);
        let name = spec.name.clone();
        let outcome = tokio::spawn(async move { handler.refresh(&name).await }).await;

        if *shutdown.borrow() {
            tracing::debug!(target: "scheduler", channel = %spec.name, "stopped during tick, result discarded");
            break;
        }

        counter!("pulse_channel_ticks_total", "channel" => spec.name.clone()).increment(1);
        match outcome {
            Ok(Ok(())) => {
                let at = clock.advance(Utc::now());
                gauge!("pulse_channel_last_sync_ts", "channel" => spec.name.clone())
                    .set(at.timestamp() as f64);
                events.publish(PulseEvent::SyncComplete {
                    channel: spec.name.clone(),
                    timestamp: at,
                });
            }
            Ok(Err(e)) => {
                clock.record_failure();
                counter!("pulse_channel_errors_total", "channel" => spec.name.clone()).increment(1);
                tracing::warn!(target: "scheduler", channel = %spec.name, error = ?e, "channel handler failed");
            }
            Err(e) => {
                clock.record_failure();
                counter!("pulse_channel_errors_total", "channel" => spec.name.clone()).increment(1);
                tracing::warn!(target: "scheduler", channel = %spec.name, error = %e, "channel handler panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn clock_never_moves_backwards() {
        let c = ChannelClock::default();
        let t1 = Utc::now();
        let t0 = t1 - ChronoDuration::seconds(30);
        assert_eq!(c.advance(t1), t1);
        assert_eq!(c.advance(t0), t1);
        assert_eq!(c.last_sync(), Some(t1));
        assert_eq!(c.syncs.load(Ordering::Relaxed), 2);
    }

    struct Nop;

    #[async_trait]
    impl ChannelHandler for Nop {
        async fn refresh(&self, _channel: &str) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn duplicate_channels_are_ignored() {
        let sink = Arc::new(crate::events::RecordingSink::new());
        let h: Arc<dyn ChannelHandler> = Arc::new(Nop);
        let s = ChannelScheduler::new(sink)
            .with_channel(ChannelSpec::new("news", Duration::from_secs(60), h.clone()))
            .with_channel(ChannelSpec::new("news", Duration::from_secs(5), h.clone()))
            .with_channel(ChannelSpec::new("scores", Duration::from_secs(30), h));
        assert_eq!(s.channel_names(), vec!["news", "scores"]);
    }
}
