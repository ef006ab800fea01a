//! Gateway endpoints with their rate limits and usage costs

use actix_web::http::Method;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);

/// Every route the gateway authenticates, rate-limits or meters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    Health,
    ListCollections,
    UploadPdf,
    IndexPdf,
    GenerateQuestions,
    EvaluateAnswers,
    AdminUsage,
    AdminIssueKey,
    AdminRevokeKey,
}

/// Request quota: `limit` requests per trailing `window`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRule {
    pub limit: u32,
    pub window: Duration,
}

impl RateLimitRule {
    pub const fn per_minute(limit: u32) -> Self {
        Self { limit, window: MINUTE }
    }

    pub const fn per_hour(limit: u32) -> Self {
        Self { limit, window: HOUR }
    }

    /// Human form used in rejection messages, e.g. "10 per hour"
    pub fn describe(&self) -> String {
        let unit = match self.window.as_secs() {
            60 => "minute".to_string(),
            3600 => "hour".to_string(),
            secs => format!("{} seconds", secs),
        };
        format!("{} per {}", self.limit, unit)
    }
}

/// Usage points charged for a successful call
pub const BASELINE_COST: u64 = 1;
pub const UPLOAD_COST: u64 = 5;
pub const INDEX_COST: u64 = 10;
pub const COST_PER_QUESTION: u64 = 1;
pub const COST_PER_ANSWER: u64 = 3;

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Health => "health",
            Endpoint::ListCollections => "list_collections",
            Endpoint::UploadPdf => "upload_pdf",
            Endpoint::IndexPdf => "index_pdf",
            Endpoint::GenerateQuestions => "generate_questions",
            Endpoint::EvaluateAnswers => "evaluate_answers",
            Endpoint::AdminUsage => "admin_usage",
            Endpoint::AdminIssueKey => "admin_generate_api_key",
            Endpoint::AdminRevokeKey => "admin_revoke_api_key",
        }
    }

    pub fn rate_limit(&self) -> RateLimitRule {
        match self {
            Endpoint::Health => RateLimitRule::per_minute(10),
            Endpoint::ListCollections => RateLimitRule::per_minute(20),
            Endpoint::UploadPdf => RateLimitRule::per_minute(5),
            Endpoint::IndexPdf => RateLimitRule::per_minute(3),
            Endpoint::GenerateQuestions => RateLimitRule::per_hour(10),
            Endpoint::EvaluateAnswers => RateLimitRule::per_hour(5),
            Endpoint::AdminUsage | Endpoint::AdminIssueKey | Endpoint::AdminRevokeKey => {
                RateLimitRule::per_minute(10)
            }
        }
    }

    /// Cost charged when the handler does not report a computed one
    pub fn base_cost(&self) -> u64 {
        match self {
            Endpoint::UploadPdf => UPLOAD_COST,
            Endpoint::IndexPdf => INDEX_COST,
            _ => BASELINE_COST,
        }
    }

    /// Health is reachable without a credential
    pub fn is_public(&self) -> bool {
        matches!(self, Endpoint::Health)
    }

    pub fn requires_admin(&self) -> bool {
        matches!(
            self,
            Endpoint::AdminUsage | Endpoint::AdminIssueKey | Endpoint::AdminRevokeKey
        )
    }

    /// Whether the endpoint receives a file body
    pub fn accepts_file(&self) -> bool {
        matches!(self, Endpoint::UploadPdf)
    }

    /// Map a request line onto a gateway endpoint.
    ///
    /// Returns `None` for routes the gateway does not guard (banner, docs,
    /// unknown paths); those are passed through untouched.
    pub fn classify(method: &Method, path: &str) -> Option<Endpoint> {
        let path = path.trim_end_matches('/');
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        let endpoint = match (method.as_str(), segments.as_slice()) {
            ("GET", ["health"]) => Endpoint::Health,
            ("GET", ["collections"]) => Endpoint::ListCollections,
            ("POST", ["upload-pdf"]) => Endpoint::UploadPdf,
            ("POST", ["index-pdf", _]) => Endpoint::IndexPdf,
            ("POST", ["generate-questions"]) => Endpoint::GenerateQuestions,
            ("POST", ["evaluate-answers"]) => Endpoint::EvaluateAnswers,
            ("GET", ["admin", "usage", _]) => Endpoint::AdminUsage,
            ("POST", ["admin", "generate-api-key"]) => Endpoint::AdminIssueKey,
            ("DELETE", ["admin", "api-keys", _]) => Endpoint::AdminRevokeKey,
            _ => return None,
        };

        Some(endpoint)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cost of a question generation call
pub fn question_generation_cost(num_questions: usize) -> u64 {
    num_questions as u64 * COST_PER_QUESTION
}

/// Cost of an answer evaluation call
pub fn answer_evaluation_cost(num_answers: usize) -> u64 {
    num_answers as u64 * COST_PER_ANSWER
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_table() {
        assert_eq!(Endpoint::Health.rate_limit(), RateLimitRule::per_minute(10));
        assert_eq!(Endpoint::ListCollections.rate_limit(), RateLimitRule::per_minute(20));
        assert_eq!(Endpoint::UploadPdf.rate_limit(), RateLimitRule::per_minute(5));
        assert_eq!(Endpoint::IndexPdf.rate_limit(), RateLimitRule::per_minute(3));
        assert_eq!(Endpoint::GenerateQuestions.rate_limit(), RateLimitRule::per_hour(10));
        assert_eq!(Endpoint::EvaluateAnswers.rate_limit(), RateLimitRule::per_hour(5));
    }

    #[test]
    fn test_costs() {
        assert_eq!(Endpoint::ListCollections.base_cost(), 1);
        assert_eq!(Endpoint::UploadPdf.base_cost(), 5);
        assert_eq!(Endpoint::IndexPdf.base_cost(), 10);
        assert_eq!(question_generation_cost(7), 7);
        assert_eq!(answer_evaluation_cost(4), 12);
    }

    #[test]
    fn test_classify_routes() {
        assert_eq!(Endpoint::classify(&Method::GET, "/health"), Some(Endpoint::Health));
        assert_eq!(
            Endpoint::classify(&Method::POST, "/index-pdf/book.pdf"),
            Some(Endpoint::IndexPdf)
        );
        assert_eq!(
            Endpoint::classify(&Method::GET, "/admin/usage/pdt_abc"),
            Some(Endpoint::AdminUsage)
        );
        assert_eq!(
            Endpoint::classify(&Method::DELETE, "/admin/api-keys/pdt_abc"),
            Some(Endpoint::AdminRevokeKey)
        );
        assert_eq!(Endpoint::classify(&Method::GET, "/"), None);
        assert_eq!(Endpoint::classify(&Method::GET, "/swagger-ui/index.html"), None);
        // Wrong method is not a gateway endpoint
        assert_eq!(Endpoint::classify(&Method::GET, "/upload-pdf"), None);
    }

    #[test]
    fn test_describe_rule() {
        assert_eq!(RateLimitRule::per_hour(10).describe(), "10 per hour");
        assert_eq!(RateLimitRule::per_minute(3).describe(), "3 per minute");
    }
}
