// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Abuse patterns and outcome tallies for simulation tests.

use super::Fixture;
use pitch_guard::models::{ActionType, ActorId, DenialKind, PolicyVerdict};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use uuid::Uuid;

/// Shape of a simulated abuse run.
#[derive(Debug, Clone)]
pub struct AbusePattern {
    /// Action every attempt performs
    pub action: ActionType,
    /// Total attempts
    pub attempts: usize,
    /// Simulated time between attempts
    pub interval: Duration,
    /// Distinct source addresses, used round-robin
    pub unique_ips: usize,
    /// Whether attempts come from one authenticated actor
    pub authenticated: bool,
    /// Distinct pitch bodies, used round-robin
    pub unique_contents: usize,
}

impl Default for AbusePattern {
    fn default() -> Self {
        Self {
            action: ActionType::Vote,
            attempts: 50,
            interval: Duration::from_secs(1),
            unique_ips: 1,
            authenticated: true,
            unique_contents: 1,
        }
    }
}

impl AbusePattern {
    /// One account voting as fast as the client allows.
    pub fn vote_burst() -> Self {
        Self {
            attempts: 60,
            interval: Duration::from_millis(500),
            ..Default::default()
        }
    }

    /// One account voting just above the base cooldown.
    pub fn paced_voting() -> Self {
        Self {
            attempts: 40,
            interval: Duration::from_secs(3),
            ..Default::default()
        }
    }

    /// Anonymous pitch spam from a single address.
    pub fn anonymous_flood() -> Self {
        Self {
            action: ActionType::PitchCreate,
            attempts: 100,
            interval: Duration::from_secs(10),
            authenticated: false,
            unique_contents: 100,
            ..Default::default()
        }
    }

    /// Anonymous pitch spam spread over many addresses.
    pub fn distributed_flood() -> Self {
        Self {
            unique_ips: 50,
            ..Self::anonymous_flood()
        }
    }

    /// One account reposting the same pitch past every cooldown.
    pub fn repost_spam() -> Self {
        Self {
            action: ActionType::PitchCreate,
            attempts: 8,
            interval: Duration::from_secs(5 * 60),
            unique_contents: 1,
            ..Default::default()
        }
    }
}

/// Addresses in 10.0.0.0/8.
pub fn generate_ips(count: usize) -> Vec<IpAddr> {
    (0..count.max(1))
        .map(|i| {
            let b = ((i >> 8) & 0xFF) as u8;
            let c = (i & 0xFF) as u8;
            IpAddr::V4(Ipv4Addr::new(10, 0, b, c))
        })
        .collect()
}

/// Distinct pitch bodies that never normalize to the same text.
pub fn generate_contents(count: usize) -> Vec<String> {
    (0..count.max(1))
        .map(|i| format!("Pitch number {i}: a neighbourhood project worth funding"))
        .collect()
}

/// Verdict counts for one run.
#[derive(Debug, Default)]
pub struct AbuseTally {
    allowed: usize,
    denied: HashMap<DenialKind, usize>,
    penalties_issued: usize,
}

impl AbuseTally {
    pub fn record(&mut self, verdict: &PolicyVerdict) {
        match verdict.denial {
            Some(kind) => *self.denied.entry(kind).or_insert(0) += 1,
            None => {
                self.allowed += 1;
                if verdict.metadata.contains_key("penalty_applied") {
                    self.penalties_issued += 1;
                }
            }
        }
    }

    pub fn allowed(&self) -> usize {
        self.allowed
    }

    pub fn denied(&self, kind: DenialKind) -> usize {
        self.denied.get(&kind).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.allowed + self.denied.values().sum::<usize>()
    }

    pub fn penalties_issued(&self) -> usize {
        self.penalties_issued
    }

    pub fn block_rate(&self) -> f64 {
        if self.total() == 0 {
            return 0.0;
        }
        (self.total() - self.allowed) as f64 / self.total() as f64
    }
}

/// Drive `pattern` through the fixture's evaluator, recording every allowed attempt.
pub async fn run(fx: &Fixture, pattern: &AbusePattern) -> (Option<ActorId>, AbuseTally) {
    let actor = pattern.authenticated.then(Uuid::new_v4);
    let ips = generate_ips(pattern.unique_ips);
    let contents = generate_contents(pattern.unique_contents);
    let mut tally = AbuseTally::default();

    for i in 0..pattern.attempts {
        fx.advance(pattern.interval);
        let from = ips[i % ips.len()];
        let content = &contents[i % contents.len()];

        let verdict = match pattern.action {
            ActionType::PitchCreate => fx.evaluator.check_create(actor, content, from, None).await,
            ActionType::PitchEdit => {
                let actor = actor.unwrap_or_else(Uuid::new_v4);
                fx.evaluator.check_edit(actor, Uuid::nil(), content, from, None).await
            }
            _ => fx.evaluator.check_vote(actor, Uuid::new_v4(), from, None).await,
        };

        if verdict.allowed {
            fx.record(actor, pattern.action, from).await;
            if let (Some(actor), ActionType::PitchCreate | ActionType::PitchEdit) = (actor, pattern.action) {
                fx.record_fingerprint(actor, content).await;
            }
        }
        tally.record(&verdict);
    }
    (actor, tally)
}
