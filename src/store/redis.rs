//! Redis-backed rate limit windows for multi-process deployments
//!
//! Each window is a sorted set scored by request time in milliseconds. A Lua
//! script evicts, counts and conditionally adds in one round trip, which Redis
//! executes atomically.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use redis::aio::ConnectionManager;
use redis::{Client, Script};
use std::fmt;
use tracing::info;

use super::rate_limit::{window_span, RateDecision, RateLimitBackend};
use super::StoreError;
use crate::domain::{Endpoint, RateLimitRule};

const CHECK_AND_INCREMENT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])
local member = ARGV[4]

redis.call('ZREMRANGEBYSCORE', key, '-inf', '(' .. (now - window))
local count = redis.call('ZCARD', key)
local allowed = 0
if count < limit then
  redis.call('ZADD', key, now, member)
  count = count + 1
  allowed = 1
end
redis.call('PEXPIRE', key, window + 1000)

local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
local oldest_score = now
if oldest[2] ~= nil then
  oldest_score = tonumber(oldest[2])
end
return {allowed, count, oldest_score}
"#;

/// Rate limit backend shared through Redis
#[derive(Clone)]
pub struct RedisBackend {
    connection: ConnectionManager,
    key_prefix: String,
    script: Script,
}

impl fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisBackend")
            .field("key_prefix", &self.key_prefix)
            .field("connection", &"<ConnectionManager>")
            .finish()
    }
}

impl RedisBackend {
    /// Connect to Redis at `url`
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        info!("Redis rate limit backend connected");

        Ok(Self {
            connection,
            key_prefix: "pdftutor:ratelimit".to_string(),
            script: Script::new(CHECK_AND_INCREMENT),
        })
    }

    fn window_key(&self, subject: &str, endpoint: Endpoint) -> String {
        window_key(&self.key_prefix, subject, endpoint)
    }
}

fn window_key(prefix: &str, subject: &str, endpoint: Endpoint) -> String {
    format!("{}:{}:{}", prefix, endpoint.as_str(), subject)
}

#[async_trait]
impl RateLimitBackend for RedisBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn check_and_increment(
        &self,
        subject: &str,
        endpoint: Endpoint,
        rule: RateLimitRule,
        now: DateTime<Utc>,
    ) -> Result<RateDecision, StoreError> {
        let span = window_span(rule)?;
        let now_ms = now.timestamp_millis();
        // Unique member so simultaneous requests in one millisecond both count
        let member = format!("{}-{}", now_ms, uuid::Uuid::new_v4().simple());

        let mut conn = self.connection.clone();
        let (allowed, count, oldest_ms): (i64, i64, i64) = self
            .script
            .key(self.window_key(subject, endpoint))
            .arg(now_ms)
            .arg(span.num_milliseconds())
            .arg(rule.limit)
            .arg(member)
            .invoke_async(&mut conn)
            .await?;

        let oldest = Utc
            .timestamp_millis_opt(oldest_ms)
            .single()
            .unwrap_or(now);

        Ok(RateDecision {
            allowed: allowed == 1,
            current: count.max(0) as u32,
            limit: rule.limit,
            reset_at: oldest + span,
        })
    }

    async fn purge_expired(&self, _now: DateTime<Utc>) -> Result<usize, StoreError> {
        // Windows carry a TTL, Redis expires them on its own
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RateLimiter;
    use chrono::Duration;
    use std::sync::Arc;

    /// Limiter on the server named by `REDIS_URL`, if any
    async fn redis_limiter() -> Option<RateLimiter> {
        let url = std::env::var("REDIS_URL").ok()?;
        let backend = RedisBackend::connect(&url).await.unwrap();
        Some(RateLimiter::new(Arc::new(backend)))
    }

    fn fresh_subject() -> String {
        format!("test-{}", uuid::Uuid::new_v4().simple())
    }

    #[test]
    fn test_window_key_layout() {
        assert_eq!(
            window_key("pdftutor:ratelimit", "abc123", Endpoint::GenerateQuestions),
            "pdftutor:ratelimit:generate_questions:abc123"
        );
    }

    #[actix_web::test]
    #[ignore = "needs a Redis server at REDIS_URL"]
    async fn test_redis_limit_then_deny() {
        let Some(limiter) = redis_limiter().await else { return };
        let subject = fresh_subject();
        let t0 = Utc::now();

        for i in 0..5 {
            let d = limiter
                .check_at(&subject, Endpoint::UploadPdf, t0 + Duration::seconds(i))
                .await
                .unwrap();
            assert!(d.allowed, "request {} should pass", i + 1);
            assert_eq!(d.current, i as u32 + 1);
        }

        let denied = limiter
            .check_at(&subject, Endpoint::UploadPdf, t0 + Duration::seconds(10))
            .await
            .unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.remaining(), 0);
        assert_eq!(
            denied.reset_at.timestamp_millis(),
            (t0 + Duration::seconds(60)).timestamp_millis()
        );
    }

    #[actix_web::test]
    #[ignore = "needs a Redis server at REDIS_URL"]
    async fn test_redis_request_exactly_window_old_still_counts() {
        let Some(limiter) = redis_limiter().await else { return };
        let subject = fresh_subject();
        let t0 = Utc::now();

        for _ in 0..3 {
            limiter.check_at(&subject, Endpoint::IndexPdf, t0).await.unwrap();
        }
        let edge = t0 + Duration::seconds(60);
        assert!(!limiter.check_at(&subject, Endpoint::IndexPdf, edge).await.unwrap().allowed);
        let after = edge + Duration::milliseconds(1);
        assert!(limiter.check_at(&subject, Endpoint::IndexPdf, after).await.unwrap().allowed);
    }
}
