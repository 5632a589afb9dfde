// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Error types for the ledgers and the configuration source.
//!
//! A denied verdict is not an error and never shows up here.

use thiserror::Error;

/// Failure of a ledger read or write.
#[derive(Debug, Error, Clone)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Failure to load live policy settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Configuration source unavailable: {0}")]
    Unavailable(String),
}

/// Result type alias for ledger operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;
