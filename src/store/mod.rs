//! Security state: API keys, usage accounting and rate-limit windows

pub mod api_keys;
pub mod rate_limit;
pub mod redis;
pub mod usage;

use thiserror::Error;

pub use api_keys::{fingerprint, key_prefix, ClientInfo, KeyRole, KeyStore};
pub use rate_limit::{RateDecision, RateLimiter};
pub use self::redis::RedisBackend;
pub use usage::{UsageSummary, UsageTracker};

/// Store-related errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
    #[error("Configuration error: {0}")]
    Config(String),
}
