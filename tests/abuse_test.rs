// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Simulated abuse runs against the evaluator.
//!
//! Each run advances a manual clock between attempts and records every
//! allowed attempt, the way the gate does.

mod harness;

use harness::abuse::{run, AbusePattern};
use harness::Fixture;
use pitch_guard::models::{ActionType, DenialKind};
use std::time::Duration;

#[tokio::test]
async fn test_vote_burst_is_throttled_and_escalated() {
    let fx = Fixture::new().await;
    let (actor, tally) = run(&fx, &AbusePattern::vote_burst()).await;

    // 2s base cooldown, doubling after the fifth vote and every vote after
    assert_eq!(tally.allowed(), 7);
    assert_eq!(tally.penalties_issued(), 3);
    assert_eq!(tally.denied(DenialKind::Cooldown), 53);
    assert!(tally.block_rate() > 0.85);

    let actor = actor.unwrap();
    assert_eq!(fx.store.all_penalties_for(actor).await.len(), 3);
}

#[tokio::test]
async fn test_paced_voting_still_escalates() {
    let fx = Fixture::new().await;
    let (_, tally) = run(&fx, &AbusePattern::paced_voting()).await;

    assert!(tally.penalties_issued() >= 1);
    assert!(tally.allowed() < 20, "allowed {}", tally.allowed());
    assert_eq!(tally.total(), 40);
}

#[tokio::test]
async fn test_anonymous_flood_capped_per_address() {
    let fx = Fixture::new().await;
    let (_, tally) = run(&fx, &AbusePattern::anonymous_flood()).await;

    assert_eq!(tally.allowed(), 20);
    assert_eq!(tally.denied(DenialKind::IpLimit), 80);
}

#[tokio::test]
async fn test_distributed_flood_stays_under_per_address_ceiling() {
    let fx = Fixture::new().await;
    let (_, tally) = run(&fx, &AbusePattern::distributed_flood()).await;

    // two attempts per address never reach the hourly ceiling
    assert_eq!(tally.allowed(), 100);
}

#[tokio::test]
async fn test_repost_spam_blocked_by_fingerprint() {
    let fx = Fixture::new().await;
    let (_, tally) = run(&fx, &AbusePattern::repost_spam()).await;

    assert_eq!(tally.allowed(), 1);
    assert_eq!(tally.denied(DenialKind::NearDuplicate), 7);
}

#[tokio::test]
async fn test_steady_pitching_hits_daily_ceiling() {
    let fx = Fixture::new().await;
    let pattern = AbusePattern {
        action: ActionType::PitchCreate,
        attempts: 15,
        interval: Duration::from_secs(120),
        unique_contents: 15,
        ..Default::default()
    };
    let (_, tally) = run(&fx, &pattern).await;

    assert_eq!(tally.allowed(), 10);
    assert_eq!(tally.denied(DenialKind::DailyLimit), 5);
    assert_eq!(tally.penalties_issued(), 0);
}
