// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Service bootstrap configuration.
//!
//! These values are fixed for the life of the process. Policy thresholds
//! live in [`crate::settings`] and can change at runtime.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

/// Configuration for the pitch-guard service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address (default: 0.0.0.0:8080)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Path to a flat JSON file of policy settings (default: none, built-in defaults)
    #[serde(default)]
    pub settings_file: Option<String>,

    /// Peers allowed to set `X-Forwarded-For` / `X-Real-IP` (default: none)
    #[serde(default)]
    pub trusted_proxies: Vec<IpAddr>,

    /// Timeouts around checks and ledger calls
    #[serde(default)]
    pub engine: EngineConfig,

    /// Background write queue
    #[serde(default)]
    pub recorder: RecorderConfig,

    /// Housekeeping intervals
    #[serde(default)]
    pub maintenance: MaintenanceConfig,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Bound on a single ledger read or penalty write in milliseconds (default: 250)
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,

    /// Bound on a whole gate request in milliseconds (default: 2000)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Queue capacity (default: 1024)
    #[serde(default = "default_recorder_capacity")]
    pub capacity: usize,

    /// How long a full queue may block the caller before the write is dropped (default: 25)
    #[serde(default = "default_enqueue_wait_ms")]
    pub enqueue_wait_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    /// Penalty sweep and activity purge interval in seconds (default: 300)
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Policy settings refresh interval in seconds (default: 60)
    #[serde(default = "default_config_refresh_secs")]
    pub config_refresh_secs: u64,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable Prometheus metrics endpoint (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics endpoint path (default: /metrics)
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

// Default value functions
fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_store_timeout_ms() -> u64 {
    250
}

fn default_request_timeout_ms() -> u64 {
    2000
}

fn default_recorder_capacity() -> usize {
    1024
}

fn default_enqueue_wait_ms() -> u64 {
    25
}

fn default_sweep_interval_secs() -> u64 {
    300
}

fn default_config_refresh_secs() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            settings_file: None,
            trusted_proxies: Vec::new(),
            engine: EngineConfig::default(),
            recorder: RecorderConfig::default(),
            maintenance: MaintenanceConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store_timeout_ms: default_store_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            capacity: default_recorder_capacity(),
            enqueue_wait_ms: default_enqueue_wait_ms(),
        }
    }
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
            config_refresh_secs: default_config_refresh_secs(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            path: default_metrics_path(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Unset or unparseable variables keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let defaults = Self::default();

        Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
            settings_file: lookup("SETTINGS_FILE").filter(|p| !p.trim().is_empty()),
            trusted_proxies: lookup("TRUSTED_PROXIES")
                .map(|list| parse_ip_list(&list))
                .unwrap_or(defaults.trusted_proxies),
            engine: EngineConfig {
                store_timeout_ms: parsed("STORE_TIMEOUT_MS").unwrap_or(defaults.engine.store_timeout_ms),
                request_timeout_ms: parsed("REQUEST_TIMEOUT_MS").unwrap_or(defaults.engine.request_timeout_ms),
            },
            recorder: RecorderConfig {
                capacity: parsed("RECORDER_CAPACITY")
                    .map(|v| v as usize)
                    .unwrap_or(defaults.recorder.capacity),
                enqueue_wait_ms: parsed("RECORDER_ENQUEUE_WAIT_MS").unwrap_or(defaults.recorder.enqueue_wait_ms),
            },
            maintenance: MaintenanceConfig {
                sweep_interval_secs: parsed("SWEEP_INTERVAL_SECS")
                    .unwrap_or(defaults.maintenance.sweep_interval_secs),
                config_refresh_secs: parsed("CONFIG_REFRESH_SECS")
                    .unwrap_or(defaults.maintenance.config_refresh_secs),
            },
            metrics: defaults.metrics,
        }
    }
}

/// Comma-separated addresses; entries that do not parse are skipped.
fn parse_ip_list(list: &str) -> Vec<IpAddr> {
    list.split(',')
        .filter_map(|entry| entry.trim().parse().ok())
        .collect()
}

impl EngineConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl RecorderConfig {
    pub fn enqueue_wait(&self) -> Duration {
        Duration::from_millis(self.enqueue_wait_ms)
    }
}

impl MaintenanceConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn config_refresh(&self) -> Duration {
        Duration::from_secs(self.config_refresh_secs.max(1))
    }
}
