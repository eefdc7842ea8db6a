// src/pipeline.rs
//! Per-channel refresh: load content → score → trend board, and on the
//! news/scores channels breaking detection → alert dispatch.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use crate::alert::{AlertCandidate, AlertDispatcher};
use crate::board::{TrendBoard, TrendSnapshot};
use crate::breaking::{detect_breaking, detect_tagged, published_within};
use crate::config::PulseConfig;
use crate::content::{ContentItem, SourceSelector};
use crate::events::{EventSink, PulseEvent};
use crate::scheduler::ChannelHandler;
use crate::scoring::select_trending;

/// Channels whose items feed breaking detection.
pub const BREAKING_CHANNELS: [&str; 2] = ["news", "scores"];

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSettings {
    pub trend_threshold: f64,
    pub trending_limit: usize,
    pub breaking_window_minutes: u64,
    pub detect_breaking: bool,
}

impl ChannelSettings {
    pub fn from_config(cfg: &PulseConfig, channel: &str) -> Self {
        Self {
            trend_threshold: cfg.trend_threshold,
            trending_limit: cfg.trending_limit,
            breaking_window_minutes: cfg.breaking_window_minutes,
            detect_breaking: BREAKING_CHANNELS.iter().any(|c| *c == channel),
        }
    }
}

pub struct ContentChannel {
    source: SourceSelector,
    board: Arc<TrendBoard>,
    dispatcher: Arc<AlertDispatcher>,
    events: Arc<dyn EventSink>,
    settings: ChannelSettings,
    /// Items already announced as breaking, with their publish time. An
    /// entry lives while the item is in the batch or still inside the window,
    /// so a single fallback tick does not re-arm it.
    announced: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl ContentChannel {
    pub fn new(
        source: SourceSelector,
        board: Arc<TrendBoard>,
        dispatcher: Arc<AlertDispatcher>,
        events: Arc<dyn EventSink>,
        settings: ChannelSettings,
    ) -> Self {
        Self {
            source,
            board,
            dispatcher,
            events,
            settings,
            announced: Mutex::new(HashMap::new()),
        }
    }

    fn scan_breaking(&self, channel: &str, items: &[ContentItem], now: DateTime<Utc>) {
        {
            let ids: HashSet<&str> = items.iter().map(|i| i.id.as_str()).collect();
            let window = self.settings.breaking_window_minutes;
            self.announced
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|id, published_at| {
                    ids.contains(id.as_str()) || published_within(*published_at, now, window)
                });
        }

        if let Some(item) = detect_breaking(items, now, self.settings.breaking_window_minutes) {
            if self.announce(channel, item, now) {
                let shown = self
                    .dispatcher
                    .trigger(AlertCandidate::critical(item.headline.clone()));
                tracing::info!(target: "channel", channel, item = %item.id, shown, "breaking item (window)");
            }
        }

        if let Some(item) = detect_tagged(items) {
            self.announce(channel, item, now);
            if self.dispatcher.trigger_page_level(&item.headline) {
                tracing::info!(target: "channel", channel, item = %item.id, "breaking banner shown (tag)");
            }
        }
    }

    /// Emit `breaking:detected` the first time an item qualifies.
    fn announce(&self, channel: &str, item: &ContentItem, now: DateTime<Utc>) -> bool {
        let fresh = self
            .announced
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(item.id.clone(), item.published_at)
            .is_none();
        if fresh {
            counter!("pulse_breaking_detected_total", "channel" => channel.to_string()).increment(1);
            self.events.publish(PulseEvent::BreakingDetected {
                item_id: item.id.clone(),
                headline: item.headline.clone(),
                detected_at: now,
            });
        }
        fresh
    }
}

#[async_trait]
impl ChannelHandler for ContentChannel {
    async fn refresh(&self, channel: &str) -> Result<()> {
        let batch = self.source.load().await;
        let now = Utc::now();

        let entries = select_trending(
            &batch.items,
            now,
            self.settings.trend_threshold,
            self.settings.trending_limit,
        );
        tracing::debug!(
            target: "channel",
            channel,
            origin = ?batch.origin,
            items = batch.items.len(),
            skipped = batch.skipped,
            trending = entries.len(),
            "channel refreshed"
        );
        self.board.publish(TrendSnapshot {
            channel: channel.to_string(),
            updated_at: now,
            origin: batch.origin,
            entries,
        });

        if self.settings.detect_breaking {
            self.scan_breaking(channel, &batch.items, now);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{ContentSource, RawContentItem, StaticContentSource};
    use crate::events::RecordingSink;
    use crate::session::{DedupMarker, MemorySessionStore, SessionStore};
    use chrono::Duration;

    fn setup(items: Vec<ContentItem>, detect: bool) -> (ContentChannel, Arc<AlertDispatcher>, Arc<TrendBoard>, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
        let dispatcher = Arc::new(AlertDispatcher::new(sink.clone(), DedupMarker::breaking_alert(store)));
        let board = Arc::new(TrendBoard::new());
        let ch = ContentChannel::new(
            SourceSelector::fallback_only(StaticContentSource::new(items)),
            board.clone(),
            dispatcher.clone(),
            sink.clone(),
            ChannelSettings {
                trend_threshold: 100.0,
                trending_limit: 5,
                breaking_window_minutes: 15,
                detect_breaking: detect,
            },
        );
        (ch, dispatcher, board, sink)
    }

    #[tokio::test]
    async fn fresh_item_is_announced_once_and_alerted() {
        let now = Utc::now();
        let items = vec![
            ContentItem::new("n1", "Bridge closed after crash", now - Duration::minutes(3)).engagement(40, 2),
            ContentItem::new("n2", "Old feature", now - Duration::hours(5)).engagement(9_000, 10),
        ];
        let (ch, dispatcher, board, sink) = setup(items, true);

        ch.refresh("news").await.unwrap();
        ch.refresh("news").await.unwrap();

        assert_eq!(sink.count("breaking:detected"), 1);
        assert_eq!(sink.count("alert:triggered"), 1);
        assert_eq!(dispatcher.active().unwrap().headline, "Bridge closed after crash");

        let snap = board.get("news").unwrap();
        let ids: Vec<_> = snap.entries.iter().map(|r| r.item.id.as_str()).collect();
        assert_eq!(ids, vec!["n2", "n1"]);
    }

    #[tokio::test]
    async fn non_breaking_channel_only_updates_board() {
        let now = Utc::now();
        let items = vec![ContentItem::new("m1", "Flash move", now).engagement(500, 0)];
        let (ch, dispatcher, board, sink) = setup(items, false);

        ch.refresh("market").await.unwrap();
        assert!(board.get("market").is_some());
        assert!(!dispatcher.is_active());
        assert!(sink.snapshot().is_empty());
    }

    #[tokio::test]
    async fn tagged_item_uses_page_level_path() {
        let now = Utc::now();
        let items = vec![ContentItem::new("t1", "Election called", now - Duration::hours(3))
            .engagement(10, 0)
            .tagged(["Breaking"])];
        let (ch, dispatcher, _board, sink) = setup(items, true);

        ch.refresh("news").await.unwrap();
        let id = dispatcher.active().unwrap().id;
        dispatcher.dismiss(&id);
        ch.refresh("news").await.unwrap();

        assert!(!dispatcher.is_active());
        assert_eq!(sink.count("alert:triggered"), 1);
        assert_eq!(sink.count("breaking:detected"), 1);
    }

    /// Live feed that is down on the second fetch only.
    struct Flaky {
        item: ContentItem,
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl ContentSource for Flaky {
        async fn fetch_latest(&self) -> Result<Vec<RawContentItem>> {
            let n = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if n == 1 {
                anyhow::bail!("feed timeout");
            }
            Ok(vec![self.item.clone().into()])
        }

        fn name(&self) -> &'static str {
            "flaky"
        }
    }

    #[tokio::test]
    async fn fallback_tick_does_not_rearm_fresh_item() {
        let now = Utc::now();
        let live = Flaky {
            item: ContentItem::new("f1", "Runway closed at airport", now - Duration::minutes(2)).engagement(80, 4),
            calls: Default::default(),
        };
        let sink = Arc::new(RecordingSink::new());
        let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
        let dispatcher = Arc::new(AlertDispatcher::new(sink.clone(), DedupMarker::breaking_alert(store)));
        let ch = ContentChannel::new(
            SourceSelector::new(Some(Box::new(live)), StaticContentSource::defaults_for("news", now)),
            Arc::new(TrendBoard::new()),
            dispatcher.clone(),
            sink.clone(),
            ChannelSettings {
                trend_threshold: 50.0,
                trending_limit: 5,
                breaking_window_minutes: 15,
                detect_breaking: true,
            },
        );

        ch.refresh("news").await.unwrap();
        let id = dispatcher.active().unwrap().id;
        dispatcher.dismiss(&id);

        ch.refresh("news").await.unwrap(); // live down, defaults only
        ch.refresh("news").await.unwrap(); // live back

        assert_eq!(sink.count("breaking:detected"), 1);
        assert_eq!(sink.count("alert:triggered"), 1);
        assert!(!dispatcher.is_active());
    }
}
