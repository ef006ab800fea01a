//! Rate limit response shaping
//!
//! Decisions come from the sliding-window `RateLimiter`; this module turns
//! them into headers and 429 rejections.

use actix_web::http::header::{HeaderMap, HeaderName, HeaderValue};
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::api::error::ApiError;
use crate::domain::Endpoint;
use crate::store::RateDecision;

/// Rate limit headers
pub const RATE_LIMIT_LIMIT: &str = "X-RateLimit-Limit";
pub const RATE_LIMIT_REMAINING: &str = "X-RateLimit-Remaining";
pub const RATE_LIMIT_RESET: &str = "X-RateLimit-Reset";
pub const RETRY_AFTER: &str = "Retry-After";

/// Add rate limit headers to a response
pub fn add_rate_limit_headers(headers: &mut HeaderMap, decision: &RateDecision) {
    headers.insert(
        HeaderName::from_static("x-ratelimit-limit"),
        HeaderValue::from(decision.limit),
    );
    headers.insert(
        HeaderName::from_static("x-ratelimit-remaining"),
        HeaderValue::from(decision.remaining()),
    );
    headers.insert(
        HeaderName::from_static("x-ratelimit-reset"),
        HeaderValue::from(decision.reset_at.timestamp()),
    );
}

/// Build the rejection for a denied request and log it as a security event
pub fn rate_limit_exceeded(
    decision: &RateDecision,
    endpoint: Endpoint,
    subject_label: &str,
    now: DateTime<Utc>,
) -> ApiError {
    let rule = endpoint.rate_limit();
    warn!(
        target: "security",
        event = "rate_limit_exceeded",
        subject = %subject_label,
        endpoint = %endpoint,
        current = decision.current,
        limit = decision.limit,
        "Rate limit exceeded"
    );

    ApiError::RateLimited {
        rule: rule.describe(),
        limit: decision.limit,
        reset_at: decision.reset_at.timestamp(),
        retry_after_secs: decision.retry_after_secs(now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::HttpResponse;
    use chrono::Duration;

    #[test]
    fn test_headers_reflect_decision() {
        let now = Utc::now();
        let decision = RateDecision {
            allowed: true,
            current: 4,
            limit: 10,
            reset_at: now + Duration::minutes(30),
        };
        let mut resp = HttpResponse::Ok().finish();
        add_rate_limit_headers(resp.headers_mut(), &decision);

        assert_eq!(resp.headers().get(RATE_LIMIT_LIMIT).unwrap(), "10");
        assert_eq!(resp.headers().get(RATE_LIMIT_REMAINING).unwrap(), "6");
        assert_eq!(
            resp.headers().get(RATE_LIMIT_RESET).unwrap().to_str().unwrap(),
            decision.reset_at.timestamp().to_string()
        );
    }

    #[test]
    fn test_exceeded_message_names_the_rule() {
        let now = Utc::now();
        let decision = RateDecision {
            allowed: false,
            current: 10,
            limit: 10,
            reset_at: now + Duration::seconds(90),
        };
        let err = rate_limit_exceeded(&decision, Endpoint::GenerateQuestions, "mobile_app", now);
        assert_eq!(err.to_string(), "Rate limit exceeded: 10 per hour");
        assert!(matches!(err, ApiError::RateLimited { retry_after_secs: 90, .. }));
    }
}
