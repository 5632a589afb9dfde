// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! In-process implementation of all three ledgers.
//!
//! Activity records are indexed by `(actor, action)` and `(ip, action)`,
//! each index an ordered set of `(created_at, id)` so a windowed count is
//! a range scan.

use super::{ActivityLedger, FingerprintStore, PenaltyLedger};
use crate::error::{StoreError, StoreResult};
use crate::models::{ActionType, ActivityRecord, ActorId, ContentFingerprint, Penalty};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

type TimeIndex = BTreeSet<(DateTime<Utc>, Uuid)>;

#[derive(Debug, Default)]
struct ActivityTables {
    records: HashMap<Uuid, ActivityRecord>,
    by_actor: HashMap<(ActorId, ActionType), TimeIndex>,
    by_ip: HashMap<(IpAddr, ActionType), TimeIndex>,
}

fn count_since(index: Option<&TimeIndex>, since: DateTime<Utc>) -> u64 {
    index
        .map(|set| set.range((since, Uuid::nil())..).count() as u64)
        .unwrap_or(0)
}

fn drop_before<K: std::hash::Hash + Eq>(map: &mut HashMap<K, TimeIndex>, cutoff: DateTime<Utc>) {
    for set in map.values_mut() {
        *set = set.split_off(&(cutoff, Uuid::nil()));
    }
    map.retain(|_, set| !set.is_empty());
}

/// Thread-safe in-memory store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    activities: Arc<RwLock<ActivityTables>>,
    penalties: Arc<RwLock<HashMap<ActorId, Vec<Penalty>>>>,
    fingerprints: Arc<RwLock<HashMap<(ActorId, String), Vec<ContentFingerprint>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of activity records currently held.
    pub async fn activity_len(&self) -> usize {
        self.activities.read().await.records.len()
    }

    /// Every penalty ever issued to `actor`, active or not.
    pub async fn all_penalties_for(&self, actor: ActorId) -> Vec<Penalty> {
        self.penalties
            .read()
            .await
            .get(&actor)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ActivityLedger for MemoryStore {
    async fn append(&self, record: ActivityRecord) -> StoreResult<()> {
        let mut tables = self.activities.write().await;
        let key = (record.created_at, record.id);
        if let Some(actor) = record.actor_id {
            tables
                .by_actor
                .entry((actor, record.action_type))
                .or_default()
                .insert(key);
        }
        tables
            .by_ip
            .entry((record.ip_address, record.action_type))
            .or_default()
            .insert(key);
        tables.records.insert(record.id, record);
        Ok(())
    }

    async fn count_for_actor_since(
        &self,
        actor: ActorId,
        action: ActionType,
        since: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let tables = self.activities.read().await;
        Ok(count_since(tables.by_actor.get(&(actor, action)), since))
    }

    async fn count_for_ip_since(
        &self,
        ip: IpAddr,
        action: ActionType,
        since: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let tables = self.activities.read().await;
        Ok(count_since(tables.by_ip.get(&(ip, action)), since))
    }

    async fn last_for_actor(
        &self,
        actor: ActorId,
        action: ActionType,
    ) -> StoreResult<Option<ActivityRecord>> {
        let tables = self.activities.read().await;
        let Some((_, id)) = tables
            .by_actor
            .get(&(actor, action))
            .and_then(|set| set.iter().next_back())
        else {
            return Ok(None);
        };
        tables
            .records
            .get(id)
            .cloned()
            .map(Some)
            .ok_or_else(|| StoreError::Corrupt(format!("index entry {id} has no activity record")))
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let mut tables = self.activities.write().await;
        let before = tables.records.len();
        tables.records.retain(|_, r| r.created_at >= cutoff);
        drop_before(&mut tables.by_actor, cutoff);
        drop_before(&mut tables.by_ip, cutoff);
        let removed = (before - tables.records.len()) as u64;
        debug!(removed, %cutoff, "Purged activity records");
        Ok(removed)
    }
}

#[async_trait]
impl PenaltyLedger for MemoryStore {
    async fn issue(&self, penalty: Penalty) -> StoreResult<()> {
        self.penalties
            .write()
            .await
            .entry(penalty.actor_id)
            .or_default()
            .push(penalty);
        Ok(())
    }

    async fn active_for_actor(&self, actor: ActorId, now: DateTime<Utc>) -> StoreResult<Vec<Penalty>> {
        let penalties = self.penalties.read().await;
        let mut active: Vec<Penalty> = penalties
            .get(&actor)
            .map(|list| list.iter().filter(|p| p.is_in_force(now)).cloned().collect())
            .unwrap_or_default();
        active.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(active)
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut penalties = self.penalties.write().await;
        let mut flipped = 0;
        for penalty in penalties.values_mut().flatten() {
            if penalty.is_active && penalty.expires_at <= now {
                penalty.is_active = false;
                flipped += 1;
            }
        }
        Ok(flipped)
    }
}

#[async_trait]
impl FingerprintStore for MemoryStore {
    async fn append(&self, fingerprint: ContentFingerprint) -> StoreResult<()> {
        self.fingerprints
            .write()
            .await
            .entry((fingerprint.actor_id, fingerprint.content_hash.clone()))
            .or_default()
            .push(fingerprint);
        Ok(())
    }

    async fn latest_for_actor(
        &self,
        actor: ActorId,
        content_hash: &str,
    ) -> StoreResult<Option<ContentFingerprint>> {
        let fingerprints = self.fingerprints.read().await;
        Ok(fingerprints
            .get(&(actor, content_hash.to_string()))
            .and_then(|list| list.iter().max_by_key(|f| f.created_at))
            .cloned())
    }
}
