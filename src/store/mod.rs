// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Persistence façades for the three ledgers.
//!
//! Counting queries are windowed on `created_at` and keyed by
//! `(actor, action)` or `(ip, action)`. Implementations must make a
//! successful append visible to every later count; counts are never
//! cached.

mod memory;

pub use memory::MemoryStore;

use crate::error::StoreResult;
use crate::models::{ActionType, ActivityRecord, ActorId, ContentFingerprint, Penalty};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::net::IpAddr;

/// Append-only record of allowed actions.
#[async_trait]
pub trait ActivityLedger: Send + Sync {
    async fn append(&self, record: ActivityRecord) -> StoreResult<()>;

    /// Records of `action` by `actor` with `created_at >= since`.
    async fn count_for_actor_since(
        &self,
        actor: ActorId,
        action: ActionType,
        since: DateTime<Utc>,
    ) -> StoreResult<u64>;

    /// Records of `action` from `ip` with `created_at >= since`, any actor.
    async fn count_for_ip_since(
        &self,
        ip: IpAddr,
        action: ActionType,
        since: DateTime<Utc>,
    ) -> StoreResult<u64>;

    /// Most recent record of `action` by `actor`.
    async fn last_for_actor(
        &self,
        actor: ActorId,
        action: ActionType,
    ) -> StoreResult<Option<ActivityRecord>>;

    /// Delete records older than `cutoff`. Returns the number removed.
    async fn purge_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;
}

/// Time-bounded penalties per actor.
#[async_trait]
pub trait PenaltyLedger: Send + Sync {
    async fn issue(&self, penalty: Penalty) -> StoreResult<()>;

    /// Penalties with `is_active` set and `expires_at > now`.
    async fn active_for_actor(&self, actor: ActorId, now: DateTime<Utc>) -> StoreResult<Vec<Penalty>>;

    /// Clear `is_active` on expired penalties. Idempotent; returns how many flipped.
    async fn sweep_expired(&self, now: DateTime<Utc>) -> StoreResult<u64>;
}

/// Fingerprints of accepted submissions.
#[async_trait]
pub trait FingerprintStore: Send + Sync {
    async fn append(&self, fingerprint: ContentFingerprint) -> StoreResult<()>;

    /// Newest fingerprint with `content_hash` posted by `actor`.
    async fn latest_for_actor(
        &self,
        actor: ActorId,
        content_hash: &str,
    ) -> StoreResult<Option<ContentFingerprint>>;
}
