//! Sliding-window rate limiting
//!
//! Each (subject, endpoint) pair owns a window of request timestamps. A
//! request is allowed while fewer than `limit` timestamps fall inside the
//! trailing window; allowing it appends its timestamp in the same critical
//! section, so two concurrent requests can never both take the last slot.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

use super::StoreError;
use crate::domain::{Endpoint, RateLimitRule};

/// Outcome of an atomic check-and-increment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    /// Requests counted in the window, including this one when allowed
    pub current: u32,
    pub limit: u32,
    /// When the oldest counted request leaves the window
    pub reset_at: DateTime<Utc>,
}

impl RateDecision {
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.current)
    }

    /// Whole seconds until a slot frees up, at least one
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> i64 {
        let millis = (self.reset_at - now).num_milliseconds();
        ((millis + 999) / 1000).max(1)
    }
}

/// Storage capability behind the rate limiter
#[async_trait]
pub trait RateLimitBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Count the window for (subject, endpoint) at `now` and, if below the
    /// limit, record `now` in it. Must be atomic per window.
    async fn check_and_increment(
        &self,
        subject: &str,
        endpoint: Endpoint,
        rule: RateLimitRule,
        now: DateTime<Utc>,
    ) -> Result<RateDecision, StoreError>;

    /// Drop windows with no live entries; returns how many were removed
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;
}

pub(crate) fn window_span(rule: RateLimitRule) -> Result<chrono::Duration, StoreError> {
    chrono::Duration::from_std(rule.window)
        .map_err(|e| StoreError::Config(format!("rate limit window out of range: {}", e)))
}

#[derive(Debug)]
struct RateWindow {
    span: chrono::Duration,
    hits: VecDeque<DateTime<Utc>>,
}

impl RateWindow {
    fn new(span: chrono::Duration) -> Self {
        Self { span, hits: VecDeque::new() }
    }

    /// Forget requests older than the window. A request exactly `span` old
    /// is still counted.
    fn evict(&mut self, now: DateTime<Utc>) {
        let cutoff = now - self.span;
        self.hits.retain(|t| *t >= cutoff);
    }

    fn oldest(&self) -> Option<DateTime<Utc>> {
        self.hits.iter().min().copied()
    }
}

/// Process-local backend. State does not survive a restart.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    windows: DashMap<(String, Endpoint), Arc<Mutex<RateWindow>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked windows
    #[cfg(test)]
    pub fn window_count(&self) -> usize {
        self.windows.len()
    }
}

#[async_trait]
impl RateLimitBackend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn check_and_increment(
        &self,
        subject: &str,
        endpoint: Endpoint,
        rule: RateLimitRule,
        now: DateTime<Utc>,
    ) -> Result<RateDecision, StoreError> {
        let span = window_span(rule)?;

        // Clone the window handle out so the map shard is released before we
        // take the per-window lock.
        let window = self
            .windows
            .entry((subject.to_string(), endpoint))
            .or_insert_with(|| Arc::new(Mutex::new(RateWindow::new(span))))
            .clone();

        let mut window = window.lock();
        window.span = span;
        window.evict(now);

        let count = window.hits.len() as u32;
        let allowed = count < rule.limit;
        if allowed {
            window.hits.push_back(now);
        }

        let current = window.hits.len() as u32;
        let reset_at = window.oldest().unwrap_or(now) + span;

        Ok(RateDecision { allowed, current, limit: rule.limit, reset_at })
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let before = self.windows.len();
        self.windows.retain(|_, window| {
            // A handle held elsewhere means a check is in flight; keep it.
            if Arc::strong_count(window) > 1 {
                return true;
            }
            let mut window = window.lock();
            window.evict(now);
            !window.hits.is_empty()
        });
        Ok(before.saturating_sub(self.windows.len()))
    }
}

/// Rate limiter applying the per-endpoint rule table
#[derive(Clone)]
pub struct RateLimiter {
    backend: Arc<dyn RateLimitBackend>,
}

impl RateLimiter {
    pub fn new(backend: Arc<dyn RateLimitBackend>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryBackend::new()))
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Check and count a request from `subject` to `endpoint` at `now`
    pub async fn check_at(
        &self,
        subject: &str,
        endpoint: Endpoint,
        now: DateTime<Utc>,
    ) -> Result<RateDecision, StoreError> {
        let rule = endpoint.rate_limit();
        let decision = self.backend.check_and_increment(subject, endpoint, rule, now).await?;
        debug!(
            endpoint = %endpoint,
            allowed = decision.allowed,
            current = decision.current,
            limit = decision.limit,
            "Rate limit checked"
        );
        Ok(decision)
    }

    pub async fn purge_expired(&self) -> Result<usize, StoreError> {
        self.backend.purge_expired(Utc::now()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[actix_web::test]
    async fn test_limit_then_deny() {
        let limiter = RateLimiter::in_memory();
        let t0 = Utc::now();

        for i in 0..5 {
            let d = limiter
                .check_at("k", Endpoint::UploadPdf, t0 + Duration::seconds(i))
                .await
                .unwrap();
            assert!(d.allowed, "request {} should pass", i + 1);
            assert_eq!(d.current, i as u32 + 1);
        }

        let denied = limiter
            .check_at("k", Endpoint::UploadPdf, t0 + Duration::seconds(10))
            .await
            .unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.remaining(), 0);
        assert_eq!(denied.reset_at, t0 + Duration::seconds(60));
    }

    #[actix_web::test]
    async fn test_window_slides_instead_of_resetting() {
        let limiter = RateLimiter::in_memory();
        let t0 = Utc::now();

        // 3 per minute: two early, one late
        limiter.check_at("k", Endpoint::IndexPdf, t0).await.unwrap();
        limiter.check_at("k", Endpoint::IndexPdf, t0 + Duration::seconds(1)).await.unwrap();
        limiter.check_at("k", Endpoint::IndexPdf, t0 + Duration::seconds(50)).await.unwrap();

        // Past a minute boundary only the first two expire
        let at_61 = t0 + Duration::seconds(61) + Duration::milliseconds(1);
        assert!(limiter.check_at("k", Endpoint::IndexPdf, at_61).await.unwrap().allowed);
        let d = limiter.check_at("k", Endpoint::IndexPdf, at_61).await.unwrap();
        assert!(d.allowed);
        assert_eq!(d.current, 3);
        assert!(!limiter.check_at("k", Endpoint::IndexPdf, at_61).await.unwrap().allowed);
    }

    #[actix_web::test]
    async fn test_request_exactly_window_old_still_counts() {
        let limiter = RateLimiter::in_memory();
        let t0 = Utc::now();

        for _ in 0..3 {
            limiter.check_at("k", Endpoint::IndexPdf, t0).await.unwrap();
        }
        let edge = t0 + Duration::seconds(60);
        assert!(!limiter.check_at("k", Endpoint::IndexPdf, edge).await.unwrap().allowed);
        let after = edge + Duration::milliseconds(1);
        assert!(limiter.check_at("k", Endpoint::IndexPdf, after).await.unwrap().allowed);
    }

    #[actix_web::test]
    async fn test_mobile_app_question_scenario() {
        let limiter = RateLimiter::in_memory();
        let t0 = Utc::now();

        for i in 0..10 {
            let at = t0 + Duration::minutes(i * 5);
            assert!(limiter.check_at("mobile_app", Endpoint::GenerateQuestions, at).await.unwrap().allowed);
        }

        let eleventh = t0 + Duration::minutes(55);
        assert!(!limiter.check_at("mobile_app", Endpoint::GenerateQuestions, eleventh).await.unwrap().allowed);

        let later = t0 + Duration::hours(1) + Duration::seconds(1);
        assert!(limiter.check_at("mobile_app", Endpoint::GenerateQuestions, later).await.unwrap().allowed);
    }

    #[actix_web::test]
    async fn test_denied_requests_do_not_consume_slots() {
        let limiter = RateLimiter::in_memory();
        let t0 = Utc::now();

        for _ in 0..3 {
            limiter.check_at("k", Endpoint::IndexPdf, t0).await.unwrap();
        }
        for i in 1..20 {
            let d = limiter.check_at("k", Endpoint::IndexPdf, t0 + Duration::seconds(i)).await.unwrap();
            assert!(!d.allowed);
            assert_eq!(d.current, 3);
        }
        let after = t0 + Duration::seconds(61);
        assert!(limiter.check_at("k", Endpoint::IndexPdf, after).await.unwrap().allowed);
    }

    #[actix_web::test]
    async fn test_keys_and_endpoints_are_independent() {
        let limiter = RateLimiter::in_memory();
        let t0 = Utc::now();

        for _ in 0..3 {
            limiter.check_at("a", Endpoint::IndexPdf, t0).await.unwrap();
        }
        assert!(!limiter.check_at("a", Endpoint::IndexPdf, t0).await.unwrap().allowed);
        assert!(limiter.check_at("b", Endpoint::IndexPdf, t0).await.unwrap().allowed);
        assert!(limiter.check_at("a", Endpoint::UploadPdf, t0).await.unwrap().allowed);
    }

    #[test]
    fn test_concurrent_checks_never_exceed_limit() {
        let backend = Arc::new(InMemoryBackend::new());
        let now = Utc::now();
        let rule = RateLimitRule::per_hour(10);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let backend = backend.clone();
                std::thread::spawn(move || {
                    let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
                    (0..25)
                        .filter(|_| {
                            rt.block_on(backend.check_and_increment(
                                "shared",
                                Endpoint::GenerateQuestions,
                                rule,
                                now,
                            ))
                            .unwrap()
                            .allowed
                        })
                        .count()
                })
            })
            .collect();

        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed, 10);
    }

    #[actix_web::test]
    async fn test_purge_drops_only_expired_windows() {
        let backend = InMemoryBackend::new();
        let t0 = Utc::now();
        let rule = RateLimitRule::per_minute(5);

        backend.check_and_increment("old", Endpoint::Health, rule, t0).await.unwrap();
        backend
            .check_and_increment("fresh", Endpoint::Health, rule, t0 + Duration::seconds(90))
            .await
            .unwrap();

        let removed = backend.purge_expired(t0 + Duration::seconds(100)).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(backend.window_count(), 1);
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let now = Utc::now();
        let d = RateDecision {
            allowed: false,
            current: 3,
            limit: 3,
            reset_at: now + Duration::milliseconds(1500),
        };
        assert_eq!(d.retry_after_secs(now), 2);
        let past = RateDecision { reset_at: now - Duration::seconds(5), ..d };
        assert_eq!(past.retry_after_secs(now), 1);
    }
}
