//! Demo that runs two channels on short intervals against static content and
//! prints every event from the bus.

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;

use newsroom_pulse::alert::spawn_notification_listener;
use newsroom_pulse::board::TrendBoard;
use newsroom_pulse::content::{SourceSelector, StaticContentSource};
use newsroom_pulse::pipeline::{ChannelSettings, ContentChannel};
use newsroom_pulse::session::{DedupMarker, MemorySessionStore, SessionStore};
use newsroom_pulse::{
    AlertDispatcher, ChannelScheduler, ChannelSpec, ContentItem, EventBus, EventSink, PulseEvent,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_target(false).init();

    let bus = Arc::new(EventBus::default());
    let sink: Arc<dyn EventSink> = bus.clone();
    let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
    let dispatcher = Arc::new(AlertDispatcher::new(
        sink.clone(),
        DedupMarker::breaking_alert(store),
    ));
    let board = Arc::new(TrendBoard::new());

    let listener = spawn_notification_listener(Arc::clone(&dispatcher), bus.subscribe());
    let mut rx = bus.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(ev) = rx.recv().await {
            println!("{:<18} {}", ev.name(), serde_json::to_string(&ev).unwrap_or_default());
        }
    });

    let now = Utc::now();
    let news = StaticContentSource::new(vec![
        ContentItem::new("n-1", "Harbour bridge closed after collision", now - ChronoDuration::minutes(4))
            .engagement(1_000, 50),
        ContentItem::new("n-2", "Mayor opens new library", now - ChronoDuration::hours(6))
            .engagement(300, 12)
            .tagged(["Breaking"]),
    ]);
    let settings = ChannelSettings {
        trend_threshold: 50.0,
        trending_limit: 5,
        breaking_window_minutes: 15,
        detect_breaking: true,
    };

    let mk = |source: StaticContentSource, detect_breaking: bool| {
        Arc::new(ContentChannel::new(
            SourceSelector::fallback_only(source),
            Arc::clone(&board),
            Arc::clone(&dispatcher),
            sink.clone(),
            ChannelSettings {
                detect_breaking,
                ..settings.clone()
            },
        ))
    };

    let handle = ChannelScheduler::new(sink.clone())
        .with_channel(ChannelSpec::new("news", Duration::from_millis(700), mk(news, true)))
        .with_channel(ChannelSpec::new(
            "market",
            Duration::from_millis(1_100),
            mk(StaticContentSource::defaults_for("market", now), false),
        ))
        .start();

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    if let Some(active) = dispatcher.active() {
        dispatcher.dismiss_after(active.id, Duration::from_millis(300)).await.ok();
    }

    // Inbound path: presentation asks for a message to be shown.
    sink.publish(PulseEvent::NotificationSend {
        title: "Maintenance".into(),
        message: "Comments paused for 10 minutes".into(),
        kind: "warning".into(),
    });
    tokio::time::sleep(Duration::from_millis(1_000)).await;
    println!("active after notify: {:?}", dispatcher.active().map(|a| a.headline));

    handle.stop().await;
    listener.abort();
    printer.abort();

    if let Some(snap) = board.get("news") {
        for r in snap.entries {
            println!("trending {:>10.1}  {}", r.score.total, r.item.headline);
        }
    }
    println!("pulse-demo done");
}
