// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Shared fixtures for policy and gate tests.

#![allow(dead_code)]

pub mod abuse;
pub mod faults;

use chrono::{DateTime, TimeZone, Utc};
use pitch_guard::{
    clock::{Clock, ManualClock},
    evaluator::{Ledgers, PolicyEvaluator},
    metrics::Metrics,
    models::{ActionType, ActivityRecord, ActorId, ContentFingerprint},
    settings::{LiveConfig, StaticSource},
    store::{ActivityLedger, FingerprintStore, MemoryStore},
};
use serde_json::Value;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// 2026-03-14 12:30:00 UTC, mid-day and mid-hour.
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 14, 12, 30, 0).unwrap()
}

pub fn ip(last: u8) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(192, 0, 2, last))
}

/// Evaluator wired to an in-memory store, a manual clock and a static settings source.
pub struct Fixture {
    pub store: MemoryStore,
    pub ledgers: Ledgers,
    pub store_timeout: Duration,
    pub clock: ManualClock,
    pub source: StaticSource,
    pub live: Arc<LiveConfig>,
    pub metrics: Arc<Metrics>,
    pub evaluator: PolicyEvaluator,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_settings(&[]).await
    }

    pub async fn with_settings(pairs: &[(&str, Value)]) -> Self {
        let store = MemoryStore::new();
        Self::build(store.clone(), Ledgers::in_memory(store), pairs, Duration::from_millis(250)).await
    }

    pub async fn build(
        store: MemoryStore,
        ledgers: Ledgers,
        pairs: &[(&str, Value)],
        store_timeout: Duration,
    ) -> Self {
        let source = StaticSource::new();
        for (key, value) in pairs {
            source.set(key, value.clone());
        }
        let live = Arc::new(LiveConfig::new(Arc::new(source.clone())));
        tokio_test::assert_ok!(live.refresh().await);

        let clock = ManualClock::new(start_time());
        let metrics = Arc::new(Metrics::new().unwrap());
        let evaluator = PolicyEvaluator::new(ledgers.clone(), live.clone(), metrics.clone())
            .with_clock(Arc::new(clock.clone()))
            .with_store_timeout(store_timeout);

        Self {
            store,
            ledgers,
            store_timeout,
            clock,
            source,
            live,
            metrics,
            evaluator,
        }
    }

    /// Another evaluator over the same ledgers, settings, metrics and clock.
    pub fn make_evaluator(&self) -> PolicyEvaluator {
        PolicyEvaluator::new(self.ledgers.clone(), self.live.clone(), self.metrics.clone())
            .with_clock(Arc::new(self.clock.clone()))
            .with_store_timeout(self.store_timeout)
    }

    /// Persist an allowed action at the current clock time, as the gate would.
    pub async fn record(&self, actor: Option<ActorId>, action: ActionType, from: IpAddr) {
        self.record_at(actor, action, from, self.clock.now()).await;
    }

    pub async fn record_at(
        &self,
        actor: Option<ActorId>,
        action: ActionType,
        from: IpAddr,
        at: DateTime<Utc>,
    ) {
        let record = ActivityRecord::new(actor, action, None, from, Some("test-agent".to_string()), at);
        ActivityLedger::append(&self.store, record).await.unwrap();
    }

    pub async fn record_fingerprint(&self, actor: ActorId, content: &str) -> Uuid {
        let pitch_id = Uuid::new_v4();
        let fp = ContentFingerprint::new(actor, content, pitch_id, self.clock.now());
        FingerprintStore::append(&self.store, fp).await.unwrap();
        pitch_id
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }
}
