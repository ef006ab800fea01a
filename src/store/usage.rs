//! Per-key usage accounting

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use utoipa::ToSchema;

use crate::domain::Endpoint;

/// Accumulated usage for one key
#[derive(Debug, Clone)]
struct UsageRecord {
    endpoints: BTreeMap<String, u64>,
    calls: u64,
    first_request: DateTime<Utc>,
    last_request: DateTime<Utc>,
}

/// Usage report for one key
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct UsageSummary {
    /// Sum of usage points across endpoints
    pub total_requests: u64,
    /// Number of metered calls
    pub total_calls: u64,
    /// Usage points per endpoint
    pub endpoints: BTreeMap<String, u64>,
    pub first_request: Option<DateTime<Utc>>,
    pub last_request: Option<DateTime<Utc>>,
}

impl UsageSummary {
    pub fn empty() -> Self {
        Self {
            total_requests: 0,
            total_calls: 0,
            endpoints: BTreeMap::new(),
            first_request: None,
            last_request: None,
        }
    }
}

/// In-memory usage tracker keyed by key fingerprint.
///
/// Records are never removed for the lifetime of the process, so usage
/// survives key revocation.
#[derive(Debug, Default)]
pub struct UsageTracker {
    usage: DashMap<String, UsageRecord>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `cost` points for `endpoint` to the key's usage
    pub fn record(&self, key_fingerprint: &str, endpoint: Endpoint, cost: u64) {
        self.record_at(key_fingerprint, endpoint, cost, Utc::now());
    }

    pub fn record_at(&self, key_fingerprint: &str, endpoint: Endpoint, cost: u64, now: DateTime<Utc>) {
        let mut entry = self
            .usage
            .entry(key_fingerprint.to_string())
            .or_insert_with(|| UsageRecord {
                endpoints: BTreeMap::new(),
                calls: 0,
                first_request: now,
                last_request: now,
            });

        *entry.endpoints.entry(endpoint.as_str().to_string()).or_insert(0) += cost;
        entry.calls += 1;
        if now > entry.last_request {
            entry.last_request = now;
        }
    }

    /// Usage summary for a key; an empty summary if it was never metered
    pub fn report(&self, key_fingerprint: &str) -> UsageSummary {
        match self.usage.get(key_fingerprint) {
            Some(record) => UsageSummary {
                total_requests: record.endpoints.values().sum(),
                total_calls: record.calls,
                endpoints: record.endpoints.clone(),
                first_request: Some(record.first_request),
                last_request: Some(record.last_request),
            },
            None => UsageSummary::empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_record_accumulates_cost_per_endpoint() {
        let tracker = UsageTracker::new();
        tracker.record("k1", Endpoint::GenerateQuestions, 7);
        tracker.record("k1", Endpoint::GenerateQuestions, 3);
        tracker.record("k1", Endpoint::UploadPdf, 5);

        let report = tracker.report("k1");
        assert_eq!(report.endpoints["generate_questions"], 10);
        assert_eq!(report.endpoints["upload_pdf"], 5);
        assert_eq!(report.total_requests, 15);
        assert_eq!(report.total_calls, 3);
    }

    #[test]
    fn test_timestamps() {
        let tracker = UsageTracker::new();
        let t0 = Utc::now();
        let t1 = t0 + Duration::seconds(30);

        tracker.record_at("k", Endpoint::ListCollections, 1, t0);
        tracker.record_at("k", Endpoint::ListCollections, 1, t1);

        let report = tracker.report("k");
        assert_eq!(report.first_request, Some(t0));
        assert_eq!(report.last_request, Some(t1));
    }

    #[test]
    fn test_keys_are_isolated() {
        let tracker = UsageTracker::new();
        tracker.record("a", Endpoint::IndexPdf, 10);
        assert_eq!(tracker.report("b"), UsageSummary::empty());
        assert_eq!(tracker.report("a").total_requests, 10);
    }
}
