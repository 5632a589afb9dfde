// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Ledger records and the transient policy verdict.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Authenticated actor identifier handed over by the auth layer.
pub type ActorId = Uuid;

/// Upper bound on any retry hint or effective cooldown: one year.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(365 * 24 * 3600);

/// Kind of user-generated action being tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    PitchCreate,
    PitchEdit,
    PitchDelete,
    Vote,
    Login,
    Register,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PitchCreate => "pitch_create",
            Self::PitchEdit => "pitch_edit",
            Self::PitchDelete => "pitch_delete",
            Self::Vote => "vote",
            Self::Login => "login",
            Self::Register => "register",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown action name.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Unknown action type: {0}")]
pub struct UnknownActionType(pub String);

impl FromStr for ActionType {
    type Err = UnknownActionType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pitch_create" => Ok(Self::PitchCreate),
            "pitch_edit" => Ok(Self::PitchEdit),
            "pitch_delete" => Ok(Self::PitchDelete),
            "vote" => Ok(Self::Vote),
            "login" => Ok(Self::Login),
            "register" => Ok(Self::Register),
            other => Err(UnknownActionType(other.to_string())),
        }
    }
}

/// Which knob a penalty tightens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PenaltyType {
    /// Divides the daily volume ceiling
    RateLimit,
    /// Multiplies the cooldown between actions
    Cooldown,
    /// Reserved for content-level restrictions; carried but not composed
    ContentRestriction,
}

/// One allowed action, as recorded by the gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: Uuid,
    /// `None` for anonymous, IP-only actors
    pub actor_id: Option<ActorId>,
    pub action_type: ActionType,
    pub target_id: Option<Uuid>,
    pub ip_address: IpAddr,
    pub user_agent: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl ActivityRecord {
    pub fn new(
        actor_id: Option<ActorId>,
        action_type: ActionType,
        target_id: Option<Uuid>,
        ip_address: IpAddr,
        user_agent: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor_id,
            action_type,
            target_id,
            ip_address,
            user_agent,
            metadata: BTreeMap::new(),
            created_at,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Time-bounded multiplier attached to an actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Penalty {
    pub id: Uuid,
    pub actor_id: ActorId,
    pub penalty_type: PenaltyType,
    pub reason: String,
    /// Always >= 1.0
    pub multiplier: f64,
    pub expires_at: DateTime<Utc>,
    /// `None` when issued by the system
    pub created_by: Option<ActorId>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Penalty {
    /// Build a penalty lasting `duration` from `now`. Multipliers below 1.0 are raised to 1.0.
    pub fn new(
        actor_id: ActorId,
        penalty_type: PenaltyType,
        reason: impl Into<String>,
        multiplier: f64,
        duration: Duration,
        created_by: Option<ActorId>,
        now: DateTime<Utc>,
    ) -> Self {
        let duration = chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(365));
        Self {
            id: Uuid::new_v4(),
            actor_id,
            penalty_type,
            reason: reason.into(),
            multiplier: if multiplier.is_finite() { multiplier.max(1.0) } else { 1.0 },
            expires_at: now + duration,
            created_by,
            is_active: true,
            created_at: now,
        }
    }

    /// The read-time filter: active flag set and not yet expired.
    pub fn is_in_force(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at > now
    }
}

/// Normalized-content hash of an accepted submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentFingerprint {
    pub id: Uuid,
    pub actor_id: ActorId,
    pub content_hash: String,
    pub original_content: String,
    pub related_target_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl ContentFingerprint {
    pub fn new(
        actor_id: ActorId,
        content: &str,
        related_target_id: Uuid,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor_id,
            content_hash: crate::fingerprint::content_hash(content),
            original_content: content.to_string(),
            related_target_id,
            created_at,
        }
    }
}

/// Why a check was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    DailyLimit,
    Cooldown,
    ContentLength,
    BlacklistedPhrase,
    NearDuplicate,
    IpLimit,
}

impl DenialKind {
    /// Permanent rejections of this specific content rather than rate limits.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::ContentLength | Self::BlacklistedPhrase)
    }
}

/// Outcome of a single policy check.
#[derive(Debug, Clone, Default)]
pub struct PolicyVerdict {
    pub allowed: bool,
    pub reason: Option<String>,
    pub retry_after: Option<Duration>,
    pub denial: Option<DenialKind>,
    pub penalties_applied: Vec<Penalty>,
    pub metadata: BTreeMap<String, Value>,
}

impl PolicyVerdict {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            ..Default::default()
        }
    }

    /// Flip the verdict to denied. The first denial wins; later calls are ignored.
    /// The retry hint is capped at [`MAX_RETRY_AFTER`].
    pub fn deny(
        &mut self,
        kind: DenialKind,
        reason: impl Into<String>,
        retry_after: Option<Duration>,
    ) -> &mut Self {
        if self.allowed {
            self.allowed = false;
            self.denial = Some(kind);
            self.reason = Some(reason.into());
            self.retry_after = retry_after.map(|d| d.min(MAX_RETRY_AFTER));
        }
        self
    }

    pub fn add_penalty(&mut self, penalty: Penalty) -> &mut Self {
        self.penalties_applied.push(penalty);
        self
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn is_denied(&self) -> bool {
        !self.allowed
    }
}
