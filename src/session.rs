// src/session.rs
//! Session-scoped key-value storage and the one-shot dedup marker.
//!
//! The core only ever touches a single key (the breaking-alert marker);
//! everything else in a session store belongs to presentation code.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub const BREAKING_ALERT_MARKER: &str = "breaking_alert_shown";

const MARKER_SET: &str = "1";

/// Minimal session storage. No removal: markers are never cleared in-session.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    inner: Mutex<HashMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.inner).get(key).cloned()
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        lock(&self.inner).insert(key.to_string(), value);
        Ok(())
    }
}

/// JSON file store, last write wins. The in-memory view is authoritative
/// even if the write to disk fails.
#[derive(Debug)]
pub struct JsonFileSessionStore {
    path: PathBuf,
    inner: Mutex<HashMap<String, String>>,
}

impl JsonFileSessionStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let map = if path.exists() {
            let s = fs::read_to_string(&path)
                .with_context(|| format!("reading session store {}", path.display()))?;
            match serde_json::from_str(&s) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(target: "session", path = %path.display(), error = %e, "session store unreadable, starting empty");
                    HashMap::new()
                }
            }
        } else {
            HashMap::new()
        };
        Ok(Self {
            path,
            inner: Mutex::new(map),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, map: &HashMap<String, String>) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating session dir {}", dir.display()))?;
        }
        let body = serde_json::to_vec_pretty(map).context("encoding session store")?;
        fs::write(&self.path, body)
            .with_context(|| format!("writing session store {}", self.path.display()))
    }
}

impl SessionStore for JsonFileSessionStore {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.inner).get(key).cloned()
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        let mut map = lock(&self.inner);
        map.insert(key.to_string(), value);
        self.persist(&map)
    }
}

/// One-shot flag over a session store.
#[derive(Clone)]
pub struct DedupMarker {
    store: Arc<dyn SessionStore>,
    key: String,
}

impl DedupMarker {
    pub fn new(store: Arc<dyn SessionStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn breaking_alert(store: Arc<dyn SessionStore>) -> Self {
        Self::new(store, BREAKING_ALERT_MARKER)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_set(&self) -> bool {
        matches!(self.store.get(&self.key).as_deref(), Some("1") | Some("true"))
    }

    /// Set the marker. Idempotent; a storage error is logged, not returned.
    pub fn mark(&self) {
        if self.is_set() {
            return;
        }
        if let Err(e) = self.store.set(&self.key, MARKER_SET.to_string()) {
            tracing::warn!(target: "session", key = %self.key, error = ?e, "failed to persist dedup marker");
        }
    }
}

impl std::fmt::Debug for DedupMarker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DedupMarker")
            .field("key", &self.key)
            .field("set", &self.is_set())
            .finish()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
