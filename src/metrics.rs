// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Prometheus counters for the engine.

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::warn;

pub struct Metrics {
    registry: Registry,
    verdicts: IntCounterVec,
    penalties_issued: IntCounterVec,
    store_failures: IntCounterVec,
    recorder_dropped: IntCounter,
}

impl Metrics {
    /// Create the counters on a private registry.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let verdicts = IntCounterVec::new(
            Opts::new("pitch_guard_verdicts_total", "Policy verdicts by action and outcome"),
            &["action", "outcome"],
        )?;
        let penalties_issued = IntCounterVec::new(
            Opts::new("pitch_guard_penalties_issued_total", "Penalties issued by rapid-action escalation"),
            &["action"],
        )?;
        let store_failures = IntCounterVec::new(
            Opts::new("pitch_guard_store_failures_total", "Ledger operations that failed or timed out"),
            &["operation"],
        )?;
        let recorder_dropped = IntCounter::new(
            "pitch_guard_recorder_dropped_total",
            "Background writes dropped because the queue stayed full",
        )?;

        registry.register(Box::new(verdicts.clone()))?;
        registry.register(Box::new(penalties_issued.clone()))?;
        registry.register(Box::new(store_failures.clone()))?;
        registry.register(Box::new(recorder_dropped.clone()))?;

        Ok(Self {
            registry,
            verdicts,
            penalties_issued,
            store_failures,
            recorder_dropped,
        })
    }

    pub fn verdict(&self, action: &str, outcome: &str) {
        self.verdicts.with_label_values(&[action, outcome]).inc();
    }

    pub fn penalty_issued(&self, action: &str) {
        self.penalties_issued.with_label_values(&[action]).inc();
    }

    pub fn store_failure(&self, operation: &str) {
        self.store_failures.with_label_values(&[operation]).inc();
    }

    pub fn recorder_dropped(&self) {
        self.recorder_dropped.inc();
    }

    pub fn verdict_count(&self, action: &str, outcome: &str) -> u64 {
        self.verdicts.with_label_values(&[action, outcome]).get()
    }

    pub fn store_failure_count(&self, operation: &str) -> u64 {
        self.store_failures.with_label_values(&[operation]).get()
    }

    pub fn dropped_count(&self) -> u64 {
        self.recorder_dropped.get()
    }

    /// Text exposition format.
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(err) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            warn!(error = %err, "Failed to encode metrics");
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
