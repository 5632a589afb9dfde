// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Pitch Guard
//!
//! Abuse-prevention engine for a content-submission platform. Every
//! pitch creation, edit and vote is checked before it happens:
//!
//! - Daily creation ceiling, tightened by rate-limit penalties
//! - Per-action cooldowns, stretched by cooldown penalties
//! - Content length bounds and blacklisted phrases
//! - Near-duplicate detection on normalized content, per actor
//! - Rapid-action escalation that penalizes subsequent requests
//! - Hourly IP buckets for anonymous actors

pub mod clock;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod fingerprint;
pub mod handlers;
pub mod maintenance;
pub mod metrics;
pub mod models;
pub mod penalty;
pub mod recorder;
pub mod settings;
pub mod store;

pub use config::Config;
pub use evaluator::{Ledgers, PolicyEvaluator};
pub use models::{ActionType, PolicyVerdict};
pub use settings::{LiveConfig, PolicySettings};
