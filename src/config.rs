// src/config.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::breaking::DEFAULT_BREAKING_WINDOW_MINUTES;

pub const ENV_CONFIG_PATH: &str = "PULSE_CONFIG_PATH";
pub const ENV_TREND_THRESHOLD: &str = "PULSE_TREND_THRESHOLD";

pub const DEFAULT_CONFIG_TOML: &str = "config/pulse.toml";
pub const DEFAULT_CONFIG_JSON: &str = "config/pulse.json";

const DEFAULT_REFRESH_INTERVAL_MS: u64 = 60_000;
const DEFAULT_TREND_THRESHOLD: f64 = 50.0;

/// Runtime configuration. Every field has a documented default, so a
/// partial file (or none at all) still yields a usable config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseConfig {
    /// Interval for channels without an entry in `channel_intervals_ms`.
    #[serde(alias = "refreshIntervalMs")]
    pub refresh_interval_ms: u64,
    /// Items must score strictly above this to trend.
    #[serde(alias = "trendThreshold")]
    pub trend_threshold: f64,
    #[serde(alias = "breakingWindowMinutes")]
    pub breaking_window_minutes: u64,
    pub channels: Vec<String>,
    #[serde(alias = "channelIntervalsMs")]
    pub channel_intervals_ms: BTreeMap<String, u64>,
    #[serde(alias = "trendingLimit")]
    pub trending_limit: usize,
    /// Display hold before a dismissed alert is torn down.
    #[serde(alias = "alertHoldMs")]
    pub alert_hold_ms: u64,
    /// Live JSON feed per channel; channels without one use built-in defaults.
    #[serde(alias = "channelEndpoints")]
    pub channel_endpoints: BTreeMap<String, String>,
    #[serde(alias = "sessionStorePath")]
    pub session_store_path: Option<PathBuf>,
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: DEFAULT_REFRESH_INTERVAL_MS,
            trend_threshold: DEFAULT_TREND_THRESHOLD,
            breaking_window_minutes: DEFAULT_BREAKING_WINDOW_MINUTES,
            channels: vec!["scores".into(), "news".into(), "market".into()],
            channel_intervals_ms: BTreeMap::from([
                ("scores".to_string(), 30_000),
                ("news".to_string(), 60_000),
                ("market".to_string(), 120_000),
            ]),
            trending_limit: 10,
            alert_hold_ms: 300,
            channel_endpoints: BTreeMap::new(),
            session_store_path: None,
        }
    }
}

impl PulseConfig {
    /// Load from an explicit path. Supports TOML or JSON.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        Ok(parse_config(&content, &ext)?.sanitized())
    }

    /// Resolve the config file:
    /// 1) $PULSE_CONFIG_PATH
    /// 2) config/pulse.toml
    /// 3) config/pulse.json
    /// 4) built-in defaults
    ///
    /// `$PULSE_TREND_THRESHOLD` is applied on top.
    pub fn load_default() -> Result<Self> {
        let cfg = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else if Path::new(DEFAULT_CONFIG_TOML).exists() {
            Self::load_from(Path::new(DEFAULT_CONFIG_TOML))?
        } else if Path::new(DEFAULT_CONFIG_JSON).exists() {
            Self::load_from(Path::new(DEFAULT_CONFIG_JSON))?
        } else {
            Self::default()
        };
        Ok(cfg.with_env_overrides())
    }

    /// Never fails: a broken config is logged and replaced by defaults.
    pub fn load_or_default() -> Self {
        match Self::load_default() {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(target: "config", error = ?e, "config load failed, using defaults");
                Self::default().with_env_overrides()
            }
        }
    }

    pub fn interval_for(&self, channel: &str) -> Duration {
        let ms = self
            .channel_intervals_ms
            .get(channel)
            .copied()
            .filter(|ms| *ms > 0)
            .unwrap_or(self.refresh_interval_ms);
        Duration::from_millis(ms)
    }

    pub fn alert_hold(&self) -> Duration {
        Duration::from_millis(self.alert_hold_ms)
    }

    fn with_env_overrides(mut self) -> Self {
        if let Some(t) = parse_threshold_env(std::env::var(ENV_TREND_THRESHOLD).ok()) {
            self.trend_threshold = t;
        }
        self
    }

    fn sanitized(mut self) -> Self {
        if self.refresh_interval_ms == 0 {
            self.refresh_interval_ms = DEFAULT_REFRESH_INTERVAL_MS;
        }
        if !self.trend_threshold.is_finite() {
            self.trend_threshold = DEFAULT_TREND_THRESHOLD;
        }
        self.channels = clean_list(std::mem::take(&mut self.channels));
        self
    }
}

fn parse_threshold_env(raw: Option<String>) -> Option<f64> {
    raw.and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

fn parse_config(s: &str, hint_ext: &str) -> Result<PulseConfig> {
    if hint_ext == "json" {
        return serde_json::from_str(s).context("parsing JSON config");
    }
    match toml::from_str(s) {
        Ok(cfg) => Ok(cfg),
        Err(toml_err) => serde_json::from_str(s)
            .map_err(|_| anyhow!(toml_err))
            .context("parsing config (tried TOML and JSON)"),
    }
}

/// Trim, drop empties, keep first occurrence order.
fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for it in items {
        let t = it.trim();
        if !t.is_empty() && !out.iter().any(|o| o == t) {
            out.push(t.to_string());
        }
    }
    out
}
