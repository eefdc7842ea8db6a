// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod alert;
pub mod api;
pub mod board;
pub mod breaking;
pub mod config;
pub mod content;
pub mod events;
pub mod metrics;
pub mod pipeline;
pub mod runtime;
pub mod scheduler;
pub mod scoring;
pub mod session;

// ---- Re-exports for stable public API ----
pub use crate::alert::{AlertCandidate, AlertDispatcher, AlertLevel, AlertRecord, AlertStatus};
pub use crate::api::create_router;
pub use crate::content::{ContentItem, ContentSource};
pub use crate::events::{EventBus, EventSink, PulseEvent};
pub use crate::runtime::{PulseHandle, PulseRuntime};
pub use crate::scheduler::{ChannelHandler, ChannelScheduler, ChannelSpec};
