// src/content.rs
//! Content items and the sources that supply them.
//!
//! A [`ContentSource`] hands back loosely-typed [`RawContentItem`]s; the
//! [`SourceSelector`] validates them into [`ContentItem`]s and decides, from
//! the fetch `Result`, whether the live feed or the static default set is
//! used for this pass.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use metrics::{counter, histogram};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

const HEADLINE_MAX_CHARS: usize = 200;

/// Immutable snapshot of one piece of content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub id: String,
    pub headline: String,
    pub published_at: DateTime<Utc>,
    pub views: u64,
    pub likes: u64,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl ContentItem {
    pub fn new(
        id: impl Into<String>,
        headline: impl Into<String>,
        published_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            headline: headline.into(),
            published_at,
            views: 0,
            likes: 0,
            tags: BTreeSet::new(),
        }
    }

    pub fn engagement(mut self, views: u64, likes: u64) -> Self {
        self.views = views;
        self.likes = likes;
        self
    }

    pub fn tagged<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }
}

/// Publish time as sent by a feed: RFC 3339 text or unix milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Millis(i64),
    Text(String),
}

impl RawTimestamp {
    fn parse(&self) -> Option<DateTime<Utc>> {
        match self {
            RawTimestamp::Millis(ms) => Utc.timestamp_millis_opt(*ms).single(),
            RawTimestamp::Text(s) => DateTime::parse_from_rfc3339(s.trim())
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

/// Wire shape of an item; any field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawContentItem {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default, alias = "title")]
    pub headline: Option<String>,
    #[serde(default, alias = "published_at")]
    pub published_at: Option<RawTimestamp>,
    #[serde(default)]
    pub views: Option<u64>,
    #[serde(default)]
    pub likes: Option<u64>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl RawContentItem {
    /// Validate into a [`ContentItem`]. `None` means malformed: no id, no
    /// parseable timestamp, or no engagement counters at all.
    pub fn into_item(self) -> Option<ContentItem> {
        let id = match self.id? {
            serde_json::Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
            serde_json::Value::Number(n) => n.to_string(),
            _ => return None,
        };
        let published_at = self.published_at.as_ref()?.parse()?;
        if self.views.is_none() && self.likes.is_none() {
            return None;
        }

        let headline = self
            .headline
            .as_deref()
            .map(normalize_headline)
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| id.clone());

        let tags = self
            .tags
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        Some(
            ContentItem::new(id, headline, published_at)
                .engagement(self.views.unwrap_or(0), self.likes.unwrap_or(0))
                .tagged(tags),
        )
    }
}

impl From<ContentItem> for RawContentItem {
    fn from(it: ContentItem) -> Self {
        Self {
            id: Some(serde_json::Value::String(it.id)),
            headline: Some(it.headline),
            published_at: Some(RawTimestamp::Millis(it.published_at.timestamp_millis())),
            views: Some(it.views),
            likes: Some(it.likes),
            tags: it.tags.into_iter().collect(),
        }
    }
}

/// Validate a batch. Returns `(accepted, skipped_count)`; malformed items
/// never abort the batch.
pub fn accept_batch(raw: Vec<RawContentItem>) -> (Vec<ContentItem>, usize) {
    let mut skipped = 0usize;
    let mut out = Vec::with_capacity(raw.len());
    for r in raw {
        match r.into_item() {
            Some(it) => out.push(it),
            None => skipped += 1,
        }
    }
    (out, skipped)
}

/// Clean a feed headline: decode entities, strip tags, fold typographic
/// quotes, collapse whitespace, cap length.
pub fn normalize_headline(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    if out.chars().count() > HEADLINE_MAX_CHARS {
        out = out.chars().take(HEADLINE_MAX_CHARS).collect();
    }
    out
}

#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn fetch_latest(&self) -> Result<Vec<RawContentItem>>;
    fn name(&self) -> &'static str;
}

/// Fixed set of items, used when the live feed is unavailable.
#[derive(Debug, Clone, Default)]
pub struct StaticContentSource {
    items: Vec<ContentItem>,
}

impl StaticContentSource {
    pub fn new(items: Vec<ContentItem>) -> Self {
        Self { items }
    }

    /// Built-in defaults for a channel, dated relative to `now`. Nothing here
    /// is younger than an hour, so defaults never qualify as breaking.
    pub fn defaults_for(channel: &str, now: DateTime<Utc>) -> Self {
        let ago = |mins: i64| now - ChronoDuration::minutes(mins);
        let items = match channel {
            "scores" => vec![
                ContentItem::new("scores-default-1", "Late equaliser earns a share of the spoils in the derby", ago(75))
                    .engagement(5_400, 320)
                    .tagged(["football"]),
                ContentItem::new("scores-default-2", "Title race tightens after weekend upsets", ago(180))
                    .engagement(3_100, 140)
                    .tagged(["football", "table"]),
            ],
            "market" => vec![
                ContentItem::new("market-default-1", "Stocks edge higher ahead of inflation data", ago(90))
                    .engagement(2_200, 60)
                    .tagged(["markets"]),
            ],
            _ => vec![
                ContentItem::new(format!("{channel}-default-1"), "Council approves new city transport plan", ago(120))
                    .engagement(1_800, 90)
                    .tagged(["local"]),
                ContentItem::new(format!("{channel}-default-2"), "Weekend weather: sunshine with scattered showers", ago(240))
                    .engagement(950, 25)
                    .tagged(["weather"]),
            ],
        };
        Self { items }
    }

    pub fn items(&self) -> &[ContentItem] {
        &self.items
    }
}

#[async_trait]
impl ContentSource for StaticContentSource {
    async fn fetch_latest(&self) -> Result<Vec<RawContentItem>> {
        Ok(self.items.iter().cloned().map(RawContentItem::from).collect())
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

// --- tolerant feed shapes ---

// Elements stay untyped here so one badly typed item cannot fail the decode.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FeedAny {
    Items(Vec<serde_json::Value>),
    Wrapped { items: Vec<serde_json::Value> },
    Data { data: Box<FeedAny> },
}

fn flatten_feed(any: FeedAny) -> Vec<serde_json::Value> {
    match any {
        FeedAny::Items(v) | FeedAny::Wrapped { items: v } => v,
        FeedAny::Data { data } => flatten_feed(*data),
    }
}

/// Parse a JSON feed body: a bare array, `{items: [...]}` or `{data: ...}`.
///
/// An element that does not fit [`RawContentItem`] comes back empty, so it is
/// skipped (and counted) at validation instead of sinking the batch.
pub fn parse_feed(body: &str) -> Result<Vec<RawContentItem>> {
    let trimmed = body.trim();
    if trimmed.is_empty() || trimmed == "null" {
        anyhow::bail!("feed returned empty/null body");
    }
    let any: FeedAny = serde_json::from_str(trimmed).context("parse content feed JSON")?;
    Ok(flatten_feed(any)
        .into_iter()
        .map(|v| {
            serde_json::from_value(v).unwrap_or_else(|e| {
                tracing::debug!(target: "content", error = %e, "feed item has wrong field types");
                RawContentItem::default()
            })
        })
        .collect())
}

/// Live JSON feed over HTTP.
#[derive(Clone)]
pub struct HttpContentSource {
    endpoint: String,
    client: Client,
    timeout: Duration,
}

impl HttpContentSource {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: Client::new(),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ContentSource for HttpContentSource {
    async fn fetch_latest(&self) -> Result<Vec<RawContentItem>> {
        let t0 = std::time::Instant::now();
        let resp = self
            .client
            .get(&self.endpoint)
            .timeout(self.timeout)
            .send()
            .await
            .with_context(|| format!("fetch {}", self.endpoint))?
            .error_for_status()
            .context("content feed non-2xx")?;
        let body = resp.text().await.context("read content feed body")?;
        let items = parse_feed(&body)?;

        histogram!("pulse_source_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        Ok(items)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchOrigin {
    Live,
    Fallback,
}

#[derive(Debug, Clone)]
pub struct ContentBatch {
    pub items: Vec<ContentItem>,
    pub origin: BatchOrigin,
    pub skipped: usize,
}

/// Live source with a static fallback, chosen per load by the fetch result.
pub struct SourceSelector {
    live: Option<Box<dyn ContentSource>>,
    fallback: StaticContentSource,
}

impl SourceSelector {
    pub fn new(live: Option<Box<dyn ContentSource>>, fallback: StaticContentSource) -> Self {
        Self { live, fallback }
    }

    pub fn fallback_only(fallback: StaticContentSource) -> Self {
        Self::new(None, fallback)
    }

    pub async fn load(&self) -> ContentBatch {
        let (raw, origin) = match &self.live {
            Some(live) => match live.fetch_latest().await {
                Ok(v) => (v, BatchOrigin::Live),
                Err(e) => {
                    tracing::warn!(target: "content", source = live.name(), error = ?e, "live source failed, using defaults");
                    counter!("pulse_source_fallback_total").increment(1);
                    (self.fallback_raw(), BatchOrigin::Fallback)
                }
            },
            None => (self.fallback_raw(), BatchOrigin::Fallback),
        };

        let (items, skipped) = accept_batch(raw);
        if skipped > 0 {
            tracing::debug!(target: "content", skipped, "malformed items skipped");
            counter!("pulse_content_skipped_total").increment(skipped as u64);
        }
        ContentBatch {
            items,
            origin,
            skipped,
        }
    }

    fn fallback_raw(&self) -> Vec<RawContentItem> {
        self.fallback
            .items()
            .iter()
            .cloned()
            .map(RawContentItem::from)
            .collect()
    }
}
