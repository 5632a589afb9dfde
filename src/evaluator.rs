// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Policy evaluator.
//!
//! Every check runs the same fixed sequence of stages and stops at the
//! first denial:
//!
//! 1. Anonymity routing: no actor means the IP-hour bucket only
//! 2. Volume ceiling (create): creations since UTC midnight
//! 3. Cooldown: time since the actor's last action of the same type
//! 4. Content gate (create/edit): length, blacklisted phrases, self-duplicates
//! 5. Rapid-action escalation: issues a cooldown penalty for *later* checks
//!
//! Ledger reads fail open: an error or timeout counts as "nothing found".
//! The only write is penalty issuance in stage 5, which is awaited but whose
//! failure never changes the verdict.

use crate::clock::{Clock, SystemClock};
use crate::error::{StoreError, StoreResult};
use crate::fingerprint;
use crate::metrics::Metrics;
use crate::models::{ActionType, ActorId, DenialKind, Penalty, PenaltyType, PolicyVerdict};
use crate::penalty::{compose_multipliers, effective_cooldown, effective_limit, of_type};
use crate::settings::{ConfigProvider, PolicySettings};
use crate::store::{ActivityLedger, FingerprintStore, MemoryStore, PenaltyLedger};
use chrono::{DateTime, DurationRound, Utc};
use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default bound on a single ledger operation.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(250);

/// The three ledgers the evaluator reads.
#[derive(Clone)]
pub struct Ledgers {
    pub activities: Arc<dyn ActivityLedger>,
    pub penalties: Arc<dyn PenaltyLedger>,
    pub fingerprints: Arc<dyn FingerprintStore>,
}

impl Ledgers {
    /// Use one in-memory store for all three ledgers.
    pub fn in_memory(store: MemoryStore) -> Self {
        Self {
            activities: Arc::new(store.clone()),
            penalties: Arc::new(store.clone()),
            fingerprints: Arc::new(store),
        }
    }
}

/// Per-check state shared by the identified-actor stages.
struct CheckContext {
    actor: ActorId,
    action: ActionType,
    now: DateTime<Utc>,
    settings: PolicySettings,
    penalties: Vec<Penalty>,
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::days(365 * 100))
}

fn until(later: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (later - now).to_std().unwrap_or(Duration::ZERO)
}

fn truncate(now: DateTime<Utc>, unit: chrono::Duration) -> DateTime<Utc> {
    now.duration_trunc(unit).unwrap_or(now)
}

/// Decision engine. Holds no per-actor state between checks.
pub struct PolicyEvaluator {
    ledgers: Ledgers,
    config: Arc<dyn ConfigProvider>,
    clock: Arc<dyn Clock>,
    metrics: Arc<Metrics>,
    store_timeout: Duration,
}

impl PolicyEvaluator {
    pub fn new(ledgers: Ledgers, config: Arc<dyn ConfigProvider>, metrics: Arc<Metrics>) -> Self {
        Self {
            ledgers,
            config,
            clock: Arc::new(SystemClock),
            metrics,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// May the actor (or anonymous IP) create a pitch with `content`?
    pub async fn check_create(
        &self,
        actor: Option<ActorId>,
        content: &str,
        ip: IpAddr,
        user_agent: Option<&str>,
    ) -> PolicyVerdict {
        let action = ActionType::PitchCreate;
        let settings = PolicySettings::resolve(self.config.as_ref());
        let now = self.clock.now();
        debug!(actor = ?actor, %ip, user_agent, %action, "Evaluating check");

        let Some(actor) = actor else {
            let verdict = self.check_anonymous(ip, action, &settings, now).await;
            return self.finish(action, None, verdict);
        };

        let ctx = self.context(actor, action, settings, now).await;
        let mut verdict = PolicyVerdict::allow();

        self.volume_ceiling(&ctx, &mut verdict).await;
        if verdict.is_denied() {
            return self.finish(action, Some(actor), verdict);
        }
        self.cooldown(&ctx, &mut verdict).await;
        if verdict.is_denied() {
            return self.finish(action, Some(actor), verdict);
        }
        self.content_gate(&ctx, content, &mut verdict).await;
        if verdict.is_denied() {
            return self.finish(action, Some(actor), verdict);
        }
        self.rapid_escalation(&ctx, &mut verdict).await;
        self.finish(action, Some(actor), verdict)
    }

    /// May the actor edit `target` so that it reads `content`? Edits always need an identity.
    pub async fn check_edit(
        &self,
        actor: ActorId,
        target: Uuid,
        content: &str,
        ip: IpAddr,
        user_agent: Option<&str>,
    ) -> PolicyVerdict {
        let action = ActionType::PitchEdit;
        let settings = PolicySettings::resolve(self.config.as_ref());
        let now = self.clock.now();
        debug!(%actor, %target, %ip, user_agent, %action, "Evaluating check");

        let ctx = self.context(actor, action, settings, now).await;
        let mut verdict = PolicyVerdict::allow();

        self.cooldown(&ctx, &mut verdict).await;
        if verdict.is_denied() {
            return self.finish(action, Some(actor), verdict);
        }
        self.content_gate(&ctx, content, &mut verdict).await;
        if verdict.is_denied() {
            return self.finish(action, Some(actor), verdict);
        }
        self.rapid_escalation(&ctx, &mut verdict).await;
        self.finish(action, Some(actor), verdict)
    }

    /// May the actor (or anonymous IP) vote on `target`?
    pub async fn check_vote(
        &self,
        actor: Option<ActorId>,
        target: Uuid,
        ip: IpAddr,
        user_agent: Option<&str>,
    ) -> PolicyVerdict {
        let action = ActionType::Vote;
        let settings = PolicySettings::resolve(self.config.as_ref());
        let now = self.clock.now();
        debug!(actor = ?actor, %target, %ip, user_agent, %action, "Evaluating check");

        let Some(actor) = actor else {
            let verdict = self.check_anonymous(ip, action, &settings, now).await;
            return self.finish(action, None, verdict);
        };

        let ctx = self.context(actor, action, settings, now).await;
        let mut verdict = PolicyVerdict::allow();

        self.cooldown(&ctx, &mut verdict).await;
        if verdict.is_denied() {
            return self.finish(action, Some(actor), verdict);
        }
        self.rapid_escalation(&ctx, &mut verdict).await;
        self.finish(action, Some(actor), verdict)
    }

    /// Record an operator-issued (or host-issued) penalty.
    pub async fn issue_penalty(&self, penalty: Penalty) -> StoreResult<()> {
        self.write("penalty_issue", self.ledgers.penalties.issue(penalty)).await
    }

    async fn context(
        &self,
        actor: ActorId,
        action: ActionType,
        settings: PolicySettings,
        now: DateTime<Utc>,
    ) -> CheckContext {
        let penalties = self
            .read(
                "active_penalties",
                Vec::new(),
                self.ledgers.penalties.active_for_actor(actor, now),
            )
            .await;
        CheckContext {
            actor,
            action,
            now,
            settings,
            penalties,
        }
    }

    async fn check_anonymous(
        &self,
        ip: IpAddr,
        action: ActionType,
        settings: &PolicySettings,
        now: DateTime<Utc>,
    ) -> PolicyVerdict {
        let mut verdict = PolicyVerdict::allow();
        let Some(max_per_hour) = settings.ip_ceiling_for(action) else {
            return verdict;
        };

        let since = now - chrono::Duration::hours(1);
        let count = self
            .read(
                "count_for_ip_since",
                0,
                self.ledgers.activities.count_for_ip_since(ip, action, since),
            )
            .await;

        if count >= max_per_hour {
            let next_hour = truncate(now, chrono::Duration::hours(1)) + chrono::Duration::hours(1);
            verdict.deny(
                DenialKind::IpLimit,
                format!("IP rate limit exceeded ({count}/{max_per_hour} per hour)"),
                Some(until(next_hour, now)),
            );
        }
        verdict
    }

    async fn volume_ceiling(&self, ctx: &CheckContext, verdict: &mut PolicyVerdict) {
        let multiplier = compose_multipliers(&ctx.penalties, PenaltyType::RateLimit, ctx.now);
        let limit = effective_limit(ctx.settings.max_pitches_per_day, multiplier);

        let day_start = truncate(ctx.now, chrono::Duration::days(1));
        let count = self
            .read(
                "count_for_actor_since",
                0,
                self.ledgers
                    .activities
                    .count_for_actor_since(ctx.actor, ActionType::PitchCreate, day_start),
            )
            .await;

        if count >= limit {
            let next_midnight = day_start + chrono::Duration::days(1);
            verdict.deny(
                DenialKind::DailyLimit,
                format!("Daily pitch limit exceeded ({count}/{limit})"),
                Some(until(next_midnight, ctx.now)),
            );
            for penalty in of_type(&ctx.penalties, PenaltyType::RateLimit, ctx.now) {
                verdict.add_penalty(penalty.clone());
            }
        }
    }

    async fn cooldown(&self, ctx: &CheckContext, verdict: &mut PolicyVerdict) {
        let Some(base) = ctx.settings.cooldown_for(ctx.action) else {
            return;
        };
        let multiplier = compose_multipliers(&ctx.penalties, PenaltyType::Cooldown, ctx.now);
        let required = effective_cooldown(base, multiplier);
        verdict.set_metadata("effective_cooldown_seconds", required.as_secs_f64());

        let last = self
            .read(
                "last_for_actor",
                None,
                self.ledgers.activities.last_for_actor(ctx.actor, ctx.action),
            )
            .await;
        let Some(last) = last else {
            return;
        };

        let elapsed = until(ctx.now, last.created_at);
        if elapsed < required {
            verdict.deny(
                DenialKind::Cooldown,
                format!("Cooldown period not met for {}", ctx.action),
                Some(required - elapsed),
            );
            for penalty in of_type(&ctx.penalties, PenaltyType::Cooldown, ctx.now) {
                verdict.add_penalty(penalty.clone());
            }
        }
    }

    async fn content_gate(&self, ctx: &CheckContext, content: &str, verdict: &mut PolicyVerdict) {
        let settings = &ctx.settings;
        let length = content.chars().count();

        if length < settings.min_pitch_length {
            verdict.deny(
                DenialKind::ContentLength,
                format!("Content too short (minimum {} characters)", settings.min_pitch_length),
                None,
            );
            return;
        }
        if length > settings.max_pitch_length {
            verdict.deny(
                DenialKind::ContentLength,
                format!("Content too long (maximum {} characters)", settings.max_pitch_length),
                None,
            );
            return;
        }

        let lowered = content.to_lowercase();
        let blacklisted = settings
            .blacklisted_phrases
            .iter()
            .filter(|phrase| !phrase.trim().is_empty())
            .any(|phrase| lowered.contains(&phrase.to_lowercase()));
        if blacklisted {
            verdict.deny(
                DenialKind::BlacklistedPhrase,
                "Content contains prohibited phrases",
                None,
            );
            return;
        }

        let hash = fingerprint::content_hash(content);
        let prior = self
            .read(
                "latest_fingerprint",
                None,
                self.ledgers.fingerprints.latest_for_actor(ctx.actor, &hash),
            )
            .await;
        if let Some(prior) = prior {
            let window_end = prior.created_at + to_chrono(settings.min_time_between_similar);
            if window_end > ctx.now {
                let hours = settings.min_time_between_similar.as_secs() / 3600;
                verdict.deny(
                    DenialKind::NearDuplicate,
                    format!("Similar content posted recently (wait {hours} hours)"),
                    Some(until(window_end, ctx.now)),
                );
            }
        }
    }

    async fn rapid_escalation(&self, ctx: &CheckContext, verdict: &mut PolicyVerdict) {
        let settings = &ctx.settings;
        if settings.rapid_action_threshold == 0 {
            return;
        }

        let window_start = ctx.now - to_chrono(settings.rapid_action_window);
        let prior = self
            .read(
                "count_for_actor_since",
                0,
                self.ledgers
                    .activities
                    .count_for_actor_since(ctx.actor, ctx.action, window_start),
            )
            .await;
        // the action being checked counts towards the window
        let observed = prior + 1;
        if observed < settings.rapid_action_threshold {
            return;
        }

        let window_minutes = settings.rapid_action_window.as_secs() / 60;
        let penalty = Penalty::new(
            ctx.actor,
            PenaltyType::Cooldown,
            format!(
                "Rapid {} actions detected ({observed} in {window_minutes} minutes)",
                ctx.action
            ),
            settings.penalty_multiplier,
            settings.penalty_duration,
            None,
            ctx.now,
        );

        match self
            .write("penalty_issue", self.ledgers.penalties.issue(penalty.clone()))
            .await
        {
            Ok(()) => {
                info!(
                    actor = %ctx.actor,
                    action = %ctx.action,
                    observed,
                    multiplier = penalty.multiplier,
                    expires_at = %penalty.expires_at,
                    "Issued rapid-action penalty"
                );
                self.metrics.penalty_issued(ctx.action.as_str());
                verdict.set_metadata("penalty_applied", true);
                verdict.set_metadata("penalty_reason", penalty.reason.clone());
                verdict.add_penalty(penalty);
            }
            Err(err) => {
                warn!(
                    actor = %ctx.actor,
                    action = %ctx.action,
                    error = %err,
                    "Penalty issuance failed, verdict unchanged"
                );
            }
        }
    }

    /// Bounded ledger read that degrades to `fallback`.
    async fn read<T, F>(&self, operation: &'static str, fallback: T, fut: F) -> T
    where
        F: Future<Output = StoreResult<T>>,
    {
        match tokio::time::timeout(self.store_timeout, fut).await {
            Ok(Ok(value)) => value,
            Ok(Err(err)) => {
                warn!(operation, error = %err, "Ledger read failed, failing open");
                self.metrics.store_failure(operation);
                fallback
            }
            Err(_) => {
                warn!(
                    operation,
                    timeout_ms = self.store_timeout.as_millis() as u64,
                    "Ledger read timed out, failing open"
                );
                self.metrics.store_failure(operation);
                fallback
            }
        }
    }

    /// Bounded ledger write. No retries.
    async fn write<F>(&self, operation: &'static str, fut: F) -> StoreResult<()>
    where
        F: Future<Output = StoreResult<()>>,
    {
        let result = match tokio::time::timeout(self.store_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.store_timeout)),
        };
        if result.is_err() {
            self.metrics.store_failure(operation);
        }
        result
    }

    fn finish(&self, action: ActionType, actor: Option<ActorId>, verdict: PolicyVerdict) -> PolicyVerdict {
        if verdict.allowed {
            debug!(actor = ?actor, %action, "Action allowed");
            self.metrics.verdict(action.as_str(), "allowed");
        } else {
            info!(
                actor = ?actor,
                %action,
                reason = verdict.reason.as_deref().unwrap_or_default(),
                retry_after_secs = verdict.retry_after.map(|d| d.as_secs()),
                "Action denied"
            );
            self.metrics.verdict(action.as_str(), "denied");
        }
        verdict
    }
}
