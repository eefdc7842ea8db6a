// src/runtime.rs
//! Explicit assembly of the core. Each component is built once here and
//! handed to its consumers; nothing is looked up globally.

use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::alert::{spawn_notification_listener, AlertDispatcher};
use crate::api::AppState;
use crate::board::TrendBoard;
use crate::config::PulseConfig;
use crate::content::{ContentSource, HttpContentSource, SourceSelector, StaticContentSource};
use crate::events::{EventBus, EventSink};
use crate::metrics::describe_metrics;
use crate::pipeline::{ChannelSettings, ContentChannel};
use crate::scheduler::{ChannelScheduler, ChannelSpec, SchedulerHandle, SyncLedger};
use crate::session::{DedupMarker, JsonFileSessionStore, MemorySessionStore, SessionStore};

pub struct PulseRuntime {
    pub config: PulseConfig,
    pub events: Arc<EventBus>,
    pub dispatcher: Arc<AlertDispatcher>,
    pub board: Arc<TrendBoard>,
}

impl PulseRuntime {
    /// Build with the session store named in the config. An unusable store
    /// file degrades to an in-memory session.
    pub fn new(config: PulseConfig) -> Self {
        let store: Arc<dyn SessionStore> = match &config.session_store_path {
            Some(p) => match JsonFileSessionStore::open(p.clone()) {
                Ok(s) => Arc::new(s),
                Err(e) => {
                    tracing::warn!(target: "session", error = ?e, "session store unavailable, using memory");
                    Arc::new(MemorySessionStore::new())
                }
            },
            None => Arc::new(MemorySessionStore::new()),
        };
        Self::with_store(config, store)
    }

    pub fn with_store(config: PulseConfig, store: Arc<dyn SessionStore>) -> Self {
        describe_metrics();
        let events = Arc::new(EventBus::default());
        let sink: Arc<dyn EventSink> = events.clone();
        let dispatcher = Arc::new(AlertDispatcher::new(sink, DedupMarker::breaking_alert(store)));
        Self {
            config,
            events,
            dispatcher,
            board: Arc::new(TrendBoard::new()),
        }
    }

    pub fn sink(&self) -> Arc<dyn EventSink> {
        self.events.clone()
    }

    /// One content channel per configured channel name.
    pub fn scheduler(&self) -> ChannelScheduler {
        let now = Utc::now();
        let mut scheduler = ChannelScheduler::new(self.sink());
        for name in &self.config.channels {
            let live = self.config.channel_endpoints.get(name).map(|url| {
                Box::new(HttpContentSource::new(url.clone())) as Box<dyn ContentSource>
            });
            let source = SourceSelector::new(live, StaticContentSource::defaults_for(name, now));
            let handler = ContentChannel::new(
                source,
                Arc::clone(&self.board),
                Arc::clone(&self.dispatcher),
                self.sink(),
                ChannelSettings::from_config(&self.config, name),
            );
            scheduler.add_channel(ChannelSpec::new(
                name.clone(),
                self.config.interval_for(name),
                Arc::new(handler),
            ));
        }
        scheduler
    }

    /// Start the scheduler and the inbound notification listener.
    pub fn start(&self) -> PulseHandle {
        let listener =
            spawn_notification_listener(Arc::clone(&self.dispatcher), self.events.subscribe());
        PulseHandle {
            scheduler: self.scheduler().start(),
            listener,
        }
    }

    pub fn app_state(&self, ledger: SyncLedger) -> AppState {
        AppState {
            dispatcher: Arc::clone(&self.dispatcher),
            board: Arc::clone(&self.board),
            ledger,
            alert_hold: self.config.alert_hold(),
        }
    }
}

pub struct PulseHandle {
    scheduler: SchedulerHandle,
    listener: JoinHandle<()>,
}

impl PulseHandle {
    pub fn ledger(&self) -> SyncLedger {
        self.scheduler.ledger()
    }

    pub async fn stop(self) {
        self.scheduler.stop().await;
        self.listener.abort();
    }
}
