// src/scoring.rs
//! # Trend Scoring
//! Pure scoring of content items from recency and engagement.
//!
//! - recency: linear decay from 100 to 0 over 20 hours (5 points per hour)
//! - engagement: `views + 2 * likes`
//! - total: recency + engagement
//!
//! No I/O, no side effects; `now` is always passed in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::content::ContentItem;

pub const MAX_RECENCY: f64 = 100.0;
pub const DECAY_PER_HOUR: f64 = 5.0;
pub const LIKE_WEIGHT: f64 = 2.0;

const MS_PER_HOUR: f64 = 3_600_000.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendScore {
    pub item_id: String,
    pub recency_score: f64,
    pub engagement_score: f64,
    pub total: f64,
}

/// An item paired with its score for one ranking pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedItem {
    pub item: ContentItem,
    pub score: TrendScore,
}

/// Age in hours; future timestamps clamp to 0.
pub fn age_hours(item: &ContentItem, now: DateTime<Utc>) -> f64 {
    let ms = now
        .signed_duration_since(item.published_at)
        .num_milliseconds();
    (ms as f64 / MS_PER_HOUR).max(0.0)
}

pub fn recency_score(item: &ContentItem, now: DateTime<Utc>) -> f64 {
    (MAX_RECENCY - age_hours(item, now) * DECAY_PER_HOUR).clamp(0.0, MAX_RECENCY)
}

pub fn engagement_score(item: &ContentItem) -> f64 {
    item.views as f64 + item.likes as f64 * LIKE_WEIGHT
}

pub fn score(item: &ContentItem, now: DateTime<Utc>) -> TrendScore {
    let recency_score = recency_score(item, now);
    let engagement_score = engagement_score(item);
    TrendScore {
        item_id: item.id.clone(),
        recency_score,
        engagement_score,
        total: recency_score + engagement_score,
    }
}

/// Ranking order: total descending, then earlier publish time, then id.
/// Total order, so repeated calls never reorder ties.
pub fn compare_ranked(a: &RankedItem, b: &RankedItem) -> Ordering {
    b.score
        .total
        .total_cmp(&a.score.total)
        .then_with(|| a.item.published_at.cmp(&b.item.published_at))
        .then_with(|| a.item.id.cmp(&b.item.id))
}

pub fn rank(items: &[ContentItem], now: DateTime<Utc>) -> Vec<RankedItem> {
    let mut ranked = items
        .iter()
        .map(|it| RankedItem {
            score: score(it, now),
            item: it.clone(),
        })
        .collect::<Vec<_>>();
    ranked.sort_by(compare_ranked);
    ranked
}

/// Items with `total > threshold`, ranked, at most `limit` of them.
pub fn select_trending(
    items: &[ContentItem],
    now: DateTime<Utc>,
    threshold: f64,
    limit: usize,
) -> Vec<RankedItem> {
    let mut out = rank(items, now);
    out.retain(|r| r.score.total > threshold);
    out.truncate(limit);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 6, 12, 0, 0).unwrap()
    }

    fn item(id: &str, mins_ago: i64, views: u64, likes: u64) -> ContentItem {
        ContentItem::new(id, id, now() - Duration::minutes(mins_ago)).engagement(views, likes)
    }

    #[test]
    fn five_minute_old_item() {
        let s = score(&item("a", 5, 1000, 50), now());
        // 5 min = 1/12 h -> 100 - 5/12
        assert!((s.recency_score - (100.0 - 5.0 / 12.0)).abs() < 1e-9);
        assert_eq!(s.engagement_score, 1100.0);
        assert!((s.total - (s.recency_score + 1100.0)).abs() < 1e-9);
    }

    #[test]
    fn recency_hits_zero_at_twenty_hours() {
        assert_eq!(recency_score(&item("a", 20 * 60, 9, 9), now()), 0.0);
        assert_eq!(recency_score(&item("b", 30 * 60, 0, 0), now()), 0.0);
        assert!(recency_score(&item("c", 20 * 60 - 1, 0, 0), now()) > 0.0);
    }

    #[test]
    fn future_items_clamp_to_full_recency() {
        let fut = ContentItem::new("f", "f", now() + Duration::hours(2));
        assert_eq!(age_hours(&fut, now()), 0.0);
        assert_eq!(recency_score(&fut, now()), MAX_RECENCY);
    }

    #[test]
    fn ties_prefer_older_then_id() {
        // Same total: recency difference compensated by views.
        let older = ContentItem::new("old", "old", now() - Duration::hours(2)).engagement(10, 0);
        let newer = ContentItem::new("new", "new", now()).engagement(0, 0);
        let same_b = ContentItem::new("b", "b", now() - Duration::hours(1)).engagement(500, 0);
        let same_a = ContentItem::new("a", "a", now() - Duration::hours(1)).engagement(500, 0);

        let ranked = rank(&[newer, older, same_b, same_a], now());
        let ids: Vec<_> = ranked.iter().map(|r| r.item.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "old", "new"]);
    }

    #[test]
    fn select_trending_filters_strictly_and_truncates() {
        let items = vec![
            item("low", 0, 0, 0),     // total 100
            item("mid", 0, 50, 0),    // 150
            item("high", 0, 500, 10), // 620
            item("top", 0, 900, 0),   // 1000
        ];
        let out = select_trending(&items, now(), 100.0, 2);
        let ids: Vec<_> = out.iter().map(|r| r.item.id.as_str()).collect();
        assert_eq!(ids, vec!["top", "high"]);
        assert!(out.iter().all(|r| r.score.total > 100.0));
    }
}
