// tests/alert_dispatch.rs
use std::sync::Arc;
use std::time::Duration;

use newsroom_pulse::alert::spawn_notification_listener;
use newsroom_pulse::events::RecordingSink;
use newsroom_pulse::session::{DedupMarker, MemorySessionStore, SessionStore};
use newsroom_pulse::{AlertCandidate, AlertDispatcher, AlertLevel, EventBus, EventSink, PulseEvent};

fn dispatcher_with(sink: Arc<dyn EventSink>) -> AlertDispatcher {
    let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
    AlertDispatcher::new(sink, DedupMarker::breaking_alert(store))
}

#[test]
fn trigger_a_then_b_keeps_a_until_dismissed() {
    let sink = Arc::new(RecordingSink::new());
    let d = dispatcher_with(sink.clone());

    assert!(d.trigger(AlertCandidate::new(AlertLevel::Warning, "A")));
    assert!(!d.trigger(AlertCandidate::critical("B")));
    let a = d.active().unwrap();
    assert_eq!(a.headline, "A");

    assert!(d.dismiss(&a.id));
    assert!(d.trigger(AlertCandidate::critical("B")));
    assert_eq!(d.active().unwrap().headline, "B");
    assert_eq!(
        sink.names(),
        vec!["alert:triggered", "alert:dismissed", "alert:triggered"]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_triggers_yield_exactly_one_active() {
    let sink = Arc::new(RecordingSink::new());
    let d = Arc::new(dispatcher_with(sink.clone()));

    let mut tasks = Vec::new();
    for i in 0..32 {
        let d = Arc::clone(&d);
        tasks.push(tokio::spawn(async move {
            if i % 4 == 0 {
                d.trigger_page_level(&format!("banner {i}"))
            } else {
                d.trigger(AlertCandidate::new(AlertLevel::Info, format!("manual {i}")))
            }
        }));
    }

    let mut wins = 0;
    for t in tasks {
        if t.await.unwrap() {
            wins += 1;
        }
    }
    assert_eq!(wins, 1);
    assert_eq!(sink.count("alert:triggered"), 1);
    assert!(d.is_active());
}

#[test]
fn page_level_is_idempotent_across_many_calls() {
    let sink = Arc::new(RecordingSink::new());
    let d = dispatcher_with(sink.clone());
    for _ in 0..10 {
        d.trigger_page_level("Breaking: flood warning");
        if let Some(a) = d.active() {
            d.dismiss(&a.id);
        }
    }
    assert_eq!(sink.count("alert:triggered"), 1);
    assert_eq!(sink.count("alert:dismissed"), 1);
}

#[test]
fn dedup_marker_is_shared_through_the_store() {
    let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
    DedupMarker::breaking_alert(store.clone()).mark();

    let sink = Arc::new(RecordingSink::new());
    let d = AlertDispatcher::new(sink.clone(), DedupMarker::breaking_alert(store));
    assert!(!d.trigger_page_level("Breaking"));
    assert!(sink.snapshot().is_empty());
}

#[tokio::test]
async fn inbound_notification_reaches_dispatcher() {
    let bus = Arc::new(EventBus::default());
    let d = Arc::new(dispatcher_with(bus.clone()));
    let listener = spawn_notification_listener(Arc::clone(&d), bus.subscribe());
    let mut rx = bus.subscribe();

    bus.publish(PulseEvent::NotificationSend {
        title: "Live".into(),
        message: "Press conference starting".into(),
        kind: "info".into(),
    });

    let triggered = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if let Ok(PulseEvent::AlertTriggered { headline, level, .. }) = rx.recv().await {
                return (headline, level);
            }
        }
    })
    .await
    .expect("alert:triggered within timeout");

    assert_eq!(triggered.0, "Live: Press conference starting");
    assert_eq!(triggered.1, AlertLevel::Info);
    assert!(d.is_active());
    listener.abort();
}
