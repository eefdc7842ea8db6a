// src/breaking.rs
//! Breaking-news qualification.
//!
//! Two independent paths:
//!   - window: the most recent item published less than `window_minutes` ago
//!   - tag: any tag containing "breaking" (case-insensitive), page-level
//!
//! Neither path looks at trend scores; an old but popular item is never
//! breaking through the window path.

use chrono::{DateTime, Utc};

use crate::content::ContentItem;

pub const DEFAULT_BREAKING_WINDOW_MINUTES: u64 = 15;
pub const BREAKING_TAG: &str = "breaking";

const MS_PER_MINUTE: i64 = 60_000;

/// `(now - published_at) < window`. Future items count as age 0.
pub fn within_window(item: &ContentItem, now: DateTime<Utc>, window_minutes: u64) -> bool {
    published_within(item.published_at, now, window_minutes)
}

pub fn published_within(published_at: DateTime<Utc>, now: DateTime<Utc>, window_minutes: u64) -> bool {
    let age_ms = now
        .signed_duration_since(published_at)
        .num_milliseconds()
        .max(0);
    let window_ms = i64::try_from(window_minutes)
        .unwrap_or(i64::MAX)
        .saturating_mul(MS_PER_MINUTE);
    age_ms < window_ms
}

/// Most recent item inside the window, if any.
pub fn detect_breaking(
    items: &[ContentItem],
    now: DateTime<Utc>,
    window_minutes: u64,
) -> Option<&ContentItem> {
    newest_first(items)
        .into_iter()
        .find(|it| within_window(it, now, window_minutes))
}

pub fn has_breaking_tag(item: &ContentItem) -> bool {
    item.tags
        .iter()
        .any(|t| t.to_lowercase().contains(BREAKING_TAG))
}

/// Page-level variant: most recent explicitly tagged item.
pub fn detect_tagged(items: &[ContentItem]) -> Option<&ContentItem> {
    newest_first(items).into_iter().find(|it| has_breaking_tag(it))
}

fn newest_first(items: &[ContentItem]) -> Vec<&ContentItem> {
    let mut v: Vec<&ContentItem> = items.iter().collect();
    v.sort_by(|a, b| {
        b.published_at
            .cmp(&a.published_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    v
}
