// src/board.rs
//! Latest trend list per channel, read by presentation (and `/trending`).

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::content::BatchOrigin;
use crate::scoring::RankedItem;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendSnapshot {
    pub channel: String,
    pub updated_at: DateTime<Utc>,
    pub origin: BatchOrigin,
    pub entries: Vec<RankedItem>,
}

#[derive(Debug, Default)]
pub struct TrendBoard {
    boards: RwLock<HashMap<String, TrendSnapshot>>,
}

impl TrendBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the channel's list; an older snapshot never overwrites a newer one.
    pub fn publish(&self, snapshot: TrendSnapshot) {
        let mut g = self.boards.write().unwrap_or_else(PoisonError::into_inner);
        match g.get(&snapshot.channel) {
            Some(cur) if cur.updated_at > snapshot.updated_at => {}
            _ => {
                g.insert(snapshot.channel.clone(), snapshot);
            }
        }
    }

    pub fn get(&self, channel: &str) -> Option<TrendSnapshot> {
        self.boards
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(channel)
            .cloned()
    }

    pub fn channels(&self) -> Vec<String> {
        let mut v: Vec<String> = self
            .boards
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        v.sort();
        v
    }
}
