// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Live policy settings.
//!
//! Operators retune thresholds by changing keys in a [`ConfigSource`].
//! [`LiveConfig`] caches the last good snapshot and only reloads when the
//! hosting process calls [`LiveConfig::refresh`]. Every check resolves a
//! fresh [`PolicySettings`] through the [`ConfigProvider`] seam; missing,
//! malformed or unreadable keys fall back to the built-in defaults.

use crate::error::ConfigError;
use crate::models::ActionType;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Setting keys understood by the evaluator.
pub mod keys {
    pub const PITCH_CREATE_COOLDOWN_SECONDS: &str = "antispam.pitch_create_cooldown_seconds";
    pub const PITCH_EDIT_COOLDOWN_SECONDS: &str = "antispam.pitch_edit_cooldown_seconds";
    pub const VOTE_COOLDOWN_SECONDS: &str = "antispam.vote_cooldown_seconds";
    pub const RAPID_ACTION_THRESHOLD: &str = "antispam.rapid_action_threshold";
    pub const RAPID_ACTION_WINDOW_MINUTES: &str = "antispam.rapid_action_window_minutes";
    pub const PENALTY_MULTIPLIER: &str = "antispam.penalty_multiplier";
    pub const PENALTY_DURATION_HOURS: &str = "antispam.penalty_duration_hours";
    pub const MIN_PITCH_LENGTH: &str = "antispam.min_pitch_length";
    pub const MAX_PITCH_LENGTH: &str = "antispam.max_pitch_length";
    pub const BLACKLISTED_PHRASES: &str = "antispam.blacklisted_phrases";
    pub const MIN_TIME_BETWEEN_SIMILAR_HOURS: &str = "antispam.min_time_between_similar_hours";
    pub const MAX_PITCHES_PER_IP_PER_HOUR: &str = "antispam.max_pitches_per_ip_per_hour";
    pub const MAX_PITCHES_PER_DAY: &str = "users.max_pitches_per_day";
}

/// Anonymous votes per IP per hour. Not operator-tunable.
pub const MAX_VOTES_PER_IP_PER_HOUR: u64 = 100;

/// Where raw key/value settings come from.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn fetch_all(&self) -> Result<HashMap<String, Value>, ConfigError>;
}

/// Synchronous key lookup used on the hot path.
///
/// `Ok(None)` means the key is not set. `Err` means the provider itself
/// cannot answer.
pub trait ConfigProvider: Send + Sync {
    fn lookup(&self, key: &str) -> Result<Option<Value>, ConfigError>;
}

/// Mutable in-memory source.
#[derive(Clone, Default)]
pub struct StaticSource {
    values: Arc<RwLock<HashMap<String, Value>>>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, key: &str, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&self, key: &str, value: impl Into<Value>) {
        if let Ok(mut values) = self.values.write() {
            values.insert(key.to_string(), value.into());
        }
    }

    pub fn remove(&self, key: &str) {
        if let Ok(mut values) = self.values.write() {
            values.remove(key);
        }
    }
}

#[async_trait]
impl ConfigSource for StaticSource {
    async fn fetch_all(&self) -> Result<HashMap<String, Value>, ConfigError> {
        self.values
            .read()
            .map(|values| values.clone())
            .map_err(|_| ConfigError::Unavailable("static source lock poisoned".to_string()))
    }
}

/// Flat JSON object of `key -> value`, read on every refresh.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ConfigSource for JsonFileSource {
    async fn fetch_all(&self) -> Result<HashMap<String, Value>, ConfigError> {
        let raw = tokio::fs::read_to_string(&self.path).await?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Cached view over a [`ConfigSource`] with explicit refresh.
pub struct LiveConfig {
    source: Arc<dyn ConfigSource>,
    cache: RwLock<Option<HashMap<String, Value>>>,
    refresh_warned: AtomicBool,
    unloaded_warned: AtomicBool,
}

impl LiveConfig {
    /// Create an empty provider. Until the first successful refresh every
    /// lookup reports the source as unavailable.
    pub fn new(source: Arc<dyn ConfigSource>) -> Self {
        Self {
            source,
            cache: RwLock::new(None),
            refresh_warned: AtomicBool::new(false),
            unloaded_warned: AtomicBool::new(false),
        }
    }

    /// Reload all keys. On failure the previous snapshot is kept.
    pub async fn refresh(&self) -> Result<usize, ConfigError> {
        match self.source.fetch_all().await {
            Ok(values) => {
                let count = values.len();
                if let Ok(mut cache) = self.cache.write() {
                    *cache = Some(values);
                }
                debug!(keys = count, "Policy settings refreshed");
                Ok(count)
            }
            Err(err) => {
                if !self.refresh_warned.swap(true, Ordering::Relaxed) {
                    warn!(error = %err, "Policy settings refresh failed, keeping last snapshot");
                }
                Err(err)
            }
        }
    }
}

impl ConfigProvider for LiveConfig {
    fn lookup(&self, key: &str) -> Result<Option<Value>, ConfigError> {
        let cache = self
            .cache
            .read()
            .map_err(|_| ConfigError::Unavailable("settings cache lock poisoned".to_string()))?;
        match cache.as_ref() {
            Some(values) => Ok(values.get(key).cloned()),
            None => {
                if !self.unloaded_warned.swap(true, Ordering::Relaxed) {
                    warn!(key, "Policy settings never loaded, using built-in defaults");
                }
                Err(ConfigError::Unavailable("settings never loaded".to_string()))
            }
        }
    }
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    let parsed: Option<f64> = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.filter(|f| f.is_finite())
}

fn as_string_list(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
        ),
        // stored as an encoded JSON array
        Value::String(s) => serde_json::from_str::<Vec<String>>(s).ok(),
        _ => None,
    }
}

/// Resolves typed values from a provider, falling back on any problem.
struct Resolver<'a> {
    provider: &'a dyn ConfigProvider,
}

impl Resolver<'_> {
    fn raw(&self, key: &str) -> Option<Value> {
        match self.provider.lookup(key) {
            Ok(value) => value,
            Err(err) => {
                debug!(key, error = %err, "Setting unavailable, using default");
                None
            }
        }
    }

    fn typed<T>(&self, key: &str, default: T, parse: impl Fn(&Value) -> Option<T>) -> T {
        match self.raw(key) {
            Some(value) => parse(&value).unwrap_or_else(|| {
                debug!(key, ?value, "Ignoring malformed setting");
                default
            }),
            None => default,
        }
    }

    fn u64(&self, key: &str, default: u64) -> u64 {
        self.typed(key, default, as_u64)
    }

    fn f64(&self, key: &str, default: f64) -> f64 {
        self.typed(key, default, as_f64)
    }

    fn string_list(&self, key: &str) -> Vec<String> {
        self.typed(key, Vec::new(), as_string_list)
    }
}

/// Resolved thresholds for one check.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicySettings {
    pub pitch_create_cooldown: Duration,
    pub pitch_edit_cooldown: Duration,
    pub vote_cooldown: Duration,
    pub rapid_action_threshold: u64,
    pub rapid_action_window: Duration,
    pub penalty_multiplier: f64,
    pub penalty_duration: Duration,
    pub min_pitch_length: usize,
    pub max_pitch_length: usize,
    pub blacklisted_phrases: Vec<String>,
    pub min_time_between_similar: Duration,
    pub max_pitches_per_ip_per_hour: u64,
    pub max_votes_per_ip_per_hour: u64,
    pub max_pitches_per_day: u64,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            pitch_create_cooldown: Duration::from_secs(60),
            pitch_edit_cooldown: Duration::from_secs(30),
            vote_cooldown: Duration::from_secs(2),
            rapid_action_threshold: 5,
            rapid_action_window: Duration::from_secs(5 * 60),
            penalty_multiplier: 2.0,
            penalty_duration: Duration::from_secs(24 * 3600),
            min_pitch_length: 3,
            max_pitch_length: 2048,
            blacklisted_phrases: Vec::new(),
            min_time_between_similar: Duration::from_secs(24 * 3600),
            max_pitches_per_ip_per_hour: 20,
            max_votes_per_ip_per_hour: MAX_VOTES_PER_IP_PER_HOUR,
            max_pitches_per_day: 10,
        }
    }
}

impl PolicySettings {
    /// Read every key through `provider`, substituting defaults.
    pub fn resolve(provider: &dyn ConfigProvider) -> Self {
        let d = Self::default();
        let r = Resolver { provider };

        let secs = |key, default: Duration| Duration::from_secs(r.u64(key, default.as_secs()));
        let minutes = |key, default: Duration| {
            Duration::from_secs(r.u64(key, default.as_secs() / 60).saturating_mul(60))
        };
        let hours = |key, default: Duration| {
            Duration::from_secs(r.u64(key, default.as_secs() / 3600).saturating_mul(3600))
        };

        let multiplier = r.f64(keys::PENALTY_MULTIPLIER, d.penalty_multiplier);
        let min_len = r.u64(keys::MIN_PITCH_LENGTH, d.min_pitch_length as u64) as usize;
        let max_len = r.u64(keys::MAX_PITCH_LENGTH, d.max_pitch_length as u64) as usize;

        Self {
            pitch_create_cooldown: secs(keys::PITCH_CREATE_COOLDOWN_SECONDS, d.pitch_create_cooldown),
            pitch_edit_cooldown: secs(keys::PITCH_EDIT_COOLDOWN_SECONDS, d.pitch_edit_cooldown),
            vote_cooldown: secs(keys::VOTE_COOLDOWN_SECONDS, d.vote_cooldown),
            rapid_action_threshold: r.u64(keys::RAPID_ACTION_THRESHOLD, d.rapid_action_threshold),
            rapid_action_window: minutes(keys::RAPID_ACTION_WINDOW_MINUTES, d.rapid_action_window),
            penalty_multiplier: if multiplier >= 1.0 { multiplier } else { d.penalty_multiplier },
            penalty_duration: hours(keys::PENALTY_DURATION_HOURS, d.penalty_duration),
            min_pitch_length: min_len,
            max_pitch_length: if max_len >= min_len { max_len } else { d.max_pitch_length.max(min_len) },
            blacklisted_phrases: r.string_list(keys::BLACKLISTED_PHRASES),
            min_time_between_similar: hours(keys::MIN_TIME_BETWEEN_SIMILAR_HOURS, d.min_time_between_similar),
            max_pitches_per_ip_per_hour: r.u64(keys::MAX_PITCHES_PER_IP_PER_HOUR, d.max_pitches_per_ip_per_hour),
            max_votes_per_ip_per_hour: MAX_VOTES_PER_IP_PER_HOUR,
            max_pitches_per_day: r.u64(keys::MAX_PITCHES_PER_DAY, d.max_pitches_per_day),
        }
    }

    /// Base cooldown for an action, `None` when the action has no cooldown.
    pub fn cooldown_for(&self, action: ActionType) -> Option<Duration> {
        match action {
            ActionType::PitchCreate => Some(self.pitch_create_cooldown),
            ActionType::PitchEdit => Some(self.pitch_edit_cooldown),
            ActionType::Vote => Some(self.vote_cooldown),
            _ => None,
        }
    }

    /// Hourly ceiling for anonymous actors, `None` when unrestricted.
    pub fn ip_ceiling_for(&self, action: ActionType) -> Option<u64> {
        match action {
            ActionType::PitchCreate => Some(self.max_pitches_per_ip_per_hour),
            ActionType::Vote => Some(self.max_votes_per_ip_per_hour),
            _ => None,
        }
    }
}

/// Load the source once at startup. A failure is logged, not fatal.
pub async fn bootstrap(source: Arc<dyn ConfigSource>) -> Arc<LiveConfig> {
    let live = Arc::new(LiveConfig::new(source));
    match live.refresh().await {
        Ok(count) => info!(keys = count, "Loaded policy settings"),
        Err(err) => warn!(error = %err, "Starting with built-in policy defaults"),
    }
    live
}
