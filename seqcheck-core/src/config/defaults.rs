//! Default configuration values for seqcheck
//!
//! This module centralizes all default values to make them easy to find and modify.

use std::time::Duration;

// Executor defaults
pub const DEFAULT_DEADLINE_SECS: u64 = 10;
pub const DEFAULT_MAX_RETRIES: u32 = 30;
pub const DEFAULT_BASE_BACKOFF_MS: u64 = 20;
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 4.0;
pub const DEFAULT_BACKOFF_JITTER: f64 = 0.125; // ±12.5% of the multiplier
pub const DEFAULT_MAX_BACKOFF_SECS: u64 = 5;
pub const DEFAULT_CONFLICT_PATTERN: &str = "restart transaction";
pub const DEFAULT_TIMEOUT_PATTERN: &str = "timeout";

// Workload defaults
pub const DEFAULT_CONCURRENCY: usize = 10;
pub const DEFAULT_KEY_COUNT: usize = 5;
pub const DEFAULT_TABLE_COUNT: usize = 10;
pub const DEFAULT_OPS: u64 = 1000;
pub const DEFAULT_STAGGER_MS: u64 = 10;

// Database defaults
pub const DEFAULT_DATA_DIR: &str = "./seqcheck-data";
pub const DEFAULT_NODE: &str = "n1";
pub const DEFAULT_DB_FILE: &str = "seqcheck.redb";

// Helper functions for Duration creation
pub const fn duration_ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

pub const fn duration_secs(secs: u64) -> Duration {
    Duration::from_secs(secs)
}
