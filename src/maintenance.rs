// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Periodic housekeeping: penalty sweep, activity retention, settings refresh.
//!
//! None of these affect correctness of a check. Expired penalties are
//! already excluded at read time, and the retention window is far longer
//! than any counting window.

use crate::clock::Clock;
use crate::error::StoreResult;
use crate::evaluator::Ledgers;
use crate::settings::LiveConfig;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Activity records older than this are purged.
pub const ACTIVITY_RETENTION_DAYS: i64 = 30;

/// Flip `is_active` off for expired penalties.
pub async fn sweep_expired_penalties(ledgers: &Ledgers, now: DateTime<Utc>) -> StoreResult<u64> {
    let flipped = ledgers.penalties.sweep_expired(now).await?;
    if flipped > 0 {
        info!(flipped, "Deactivated expired penalties");
    }
    Ok(flipped)
}

/// Delete activity records past the retention window.
pub async fn purge_old_activities(ledgers: &Ledgers, now: DateTime<Utc>) -> StoreResult<u64> {
    let cutoff = now - chrono::Duration::days(ACTIVITY_RETENTION_DAYS);
    let removed = ledgers.activities.purge_before(cutoff).await?;
    if removed > 0 {
        info!(removed, %cutoff, "Purged old activity records");
    }
    Ok(removed)
}

/// Run sweep/purge every `sweep_every` and settings refresh every `refresh_every`.
pub fn spawn_maintenance(
    ledgers: Ledgers,
    config: Arc<LiveConfig>,
    clock: Arc<dyn Clock>,
    sweep_every: Duration,
    refresh_every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut sweep = tokio::time::interval(sweep_every);
        let mut refresh = tokio::time::interval(refresh_every);
        loop {
            tokio::select! {
                _ = sweep.tick() => {
                    let now = clock.now();
                    if let Err(err) = sweep_expired_penalties(&ledgers, now).await {
                        warn!(error = %err, "Penalty sweep failed");
                    }
                    if let Err(err) = purge_old_activities(&ledgers, now).await {
                        warn!(error = %err, "Activity purge failed");
                    }
                }
                _ = refresh.tick() => {
                    // failures are already logged once by LiveConfig
                    let _ = config.refresh().await;
                }
            }
        }
    })
}
