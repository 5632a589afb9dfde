// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Ledgers that fail or stall on demand.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pitch_guard::{
    error::{StoreError, StoreResult},
    evaluator::Ledgers,
    models::{ActionType, ActivityRecord, ActorId, ContentFingerprint, Penalty},
    store::{ActivityLedger, FingerprintStore, MemoryStore, PenaltyLedger},
};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

/// What the faulty ledger should do wrong.
#[derive(Debug, Clone, Copy, Default)]
pub struct FaultPlan {
    /// Every read returns `StoreError::Unavailable`
    pub fail_reads: bool,
    /// Every read sleeps this long before answering
    pub read_delay: Option<Duration>,
    /// Penalty issuance returns an error
    pub fail_penalty_writes: bool,
}

/// Wraps a [`MemoryStore`] and injects the planned faults.
#[derive(Clone)]
pub struct FaultyStore {
    inner: MemoryStore,
    plan: FaultPlan,
}

impl FaultyStore {
    pub fn new(inner: MemoryStore, plan: FaultPlan) -> Self {
        Self { inner, plan }
    }

    pub fn ledgers(&self) -> Ledgers {
        Ledgers {
            activities: Arc::new(self.clone()),
            penalties: Arc::new(self.clone()),
            fingerprints: Arc::new(self.clone()),
        }
    }

    async fn before_read(&self) -> StoreResult<()> {
        if let Some(delay) = self.plan.read_delay {
            tokio::time::sleep(delay).await;
        }
        if self.plan.fail_reads {
            return Err(StoreError::Unavailable("injected read failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ActivityLedger for FaultyStore {
    async fn append(&self, record: ActivityRecord) -> StoreResult<()> {
        ActivityLedger::append(&self.inner, record).await
    }

    async fn count_for_actor_since(
        &self,
        actor: ActorId,
        action: ActionType,
        since: DateTime<Utc>,
    ) -> StoreResult<u64> {
        self.before_read().await?;
        self.inner.count_for_actor_since(actor, action, since).await
    }

    async fn count_for_ip_since(
        &self,
        ip: IpAddr,
        action: ActionType,
        since: DateTime<Utc>,
    ) -> StoreResult<u64> {
        self.before_read().await?;
        self.inner.count_for_ip_since(ip, action, since).await
    }

    async fn last_for_actor(
        &self,
        actor: ActorId,
        action: ActionType,
    ) -> StoreResult<Option<ActivityRecord>> {
        self.before_read().await?;
        self.inner.last_for_actor(actor, action).await
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        self.inner.purge_before(cutoff).await
    }
}

#[async_trait]
impl PenaltyLedger for FaultyStore {
    async fn issue(&self, penalty: Penalty) -> StoreResult<()> {
        if self.plan.fail_penalty_writes {
            return Err(StoreError::Unavailable("injected write failure".to_string()));
        }
        self.inner.issue(penalty).await
    }

    async fn active_for_actor(&self, actor: ActorId, now: DateTime<Utc>) -> StoreResult<Vec<Penalty>> {
        self.before_read().await?;
        self.inner.active_for_actor(actor, now).await
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        self.inner.sweep_expired(now).await
    }
}

#[async_trait]
impl FingerprintStore for FaultyStore {
    async fn append(&self, fingerprint: ContentFingerprint) -> StoreResult<()> {
        FingerprintStore::append(&self.inner, fingerprint).await
    }

    async fn latest_for_actor(
        &self,
        actor: ActorId,
        content_hash: &str,
    ) -> StoreResult<Option<ContentFingerprint>> {
        self.before_read().await?;
        self.inner.latest_for_actor(actor, content_hash).await
    }
}
