// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Multiplier composition for active penalties.
//!
//! Multipliers of the same penalty type compose by multiplication. The
//! fold starts at [`IDENTITY_MULTIPLIER`], so an actor with no penalties
//! gets exactly the base values. Multiplication is commutative, so the
//! order penalties come back from the ledger does not matter.

use crate::models::{Penalty, PenaltyType, MAX_RETRY_AFTER};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Neutral element of penalty composition.
pub const IDENTITY_MULTIPLIER: f64 = 1.0;

/// Product of the multipliers of all in-force penalties of `penalty_type`.
pub fn compose_multipliers<'a, I>(penalties: I, penalty_type: PenaltyType, now: DateTime<Utc>) -> f64
where
    I: IntoIterator<Item = &'a Penalty>,
{
    penalties
        .into_iter()
        .filter(|p| p.penalty_type == penalty_type && p.is_in_force(now))
        .map(|p| p.multiplier.max(IDENTITY_MULTIPLIER))
        .fold(IDENTITY_MULTIPLIER, |acc, m| acc * m)
}

/// `base / product`, floored.
pub fn effective_limit(base: u64, multiplier: f64) -> u64 {
    if multiplier <= IDENTITY_MULTIPLIER {
        return base;
    }
    (base as f64 / multiplier).floor() as u64
}

/// `base * product`, capped at [`MAX_RETRY_AFTER`].
pub fn effective_cooldown(base: Duration, multiplier: f64) -> Duration {
    if multiplier <= IDENTITY_MULTIPLIER {
        return base.min(MAX_RETRY_AFTER);
    }
    Duration::try_from_secs_f64(base.as_secs_f64() * multiplier)
        .map_or(MAX_RETRY_AFTER, |d| d.min(MAX_RETRY_AFTER))
}

/// In-force penalties of one type, for reporting on a verdict.
pub fn of_type<'a>(
    penalties: &'a [Penalty],
    penalty_type: PenaltyType,
    now: DateTime<Utc>,
) -> impl Iterator<Item = &'a Penalty> + 'a {
    penalties
        .iter()
        .filter(move |p| p.penalty_type == penalty_type && p.is_in_force(now))
}
