//! Central Configuration Constants
//!
//! Single source of truth for process-level defaults. Everything a policy
//! file can express lives in `logic::policy::config` instead.

use std::path::PathBuf;

/// App version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// App name (also the data directory name)
pub const APP_NAME: &str = "submission-shield";

/// Reputation sweep + quarantine expiry interval (seconds)
pub const DEFAULT_SWEEP_INTERVAL: u64 = 5 * 60;

/// Retrain interval (seconds)
pub const DEFAULT_RETRAIN_INTERVAL: u64 = 60 * 60;

/// Quarantine SQLite file inside the data directory
pub const QUARANTINE_DB_FILE: &str = "quarantine.db";

// ============================================
// Helper functions to read from env with fallback
// ============================================

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

/// Policy JSON file, if one is configured
pub fn get_policy_path() -> Option<PathBuf> {
    std::env::var("SHIELD_POLICY_PATH")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
}

/// Data directory for snapshots, dataset and quarantine log
pub fn get_data_dir() -> PathBuf {
    std::env::var("SHIELD_DATA_DIR")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_NAME)
        })
}

pub fn get_sweep_interval() -> u64 {
    env_u64("SHIELD_SWEEP_INTERVAL", DEFAULT_SWEEP_INTERVAL)
}

pub fn get_retrain_interval() -> u64 {
    env_u64("SHIELD_RETRAIN_INTERVAL", DEFAULT_RETRAIN_INTERVAL)
}

/// CAPTCHA timeout override in milliseconds; None defers to the policy
pub fn get_captcha_timeout_ms() -> Option<u64> {
    std::env::var("SHIELD_CAPTCHA_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .filter(|v: &u64| *v > 0)
}

/// Check if the learning loop (dataset + retraining) is enabled
pub fn is_learning_enabled() -> bool {
    std::env::var("SHIELD_LEARNING_ENABLED")
        .map(|s| s.to_lowercase() != "false" && s != "0")
        .unwrap_or(true)
}
