//! Usage Tracking
//!
//! Handlers that compute a call's cost attach it to their response; the
//! gateway records it after a successful dispatch.

use actix_web::{dev::ServiceRequest, HttpResponse};
use std::net::IpAddr;
use tracing::debug;

use crate::domain::Endpoint;
use crate::store::{ClientInfo, UsageTracker};

/// Cost of a call as computed by its handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageCost(pub u64);

/// Attach a computed cost to a handler response
pub fn with_cost(mut response: HttpResponse, cost: u64) -> HttpResponse {
    response.extensions_mut().insert(UsageCost(cost));
    response
}

/// Record usage for a successful call, preferring the handler's cost
pub fn record_usage(
    tracker: &UsageTracker,
    client: &ClientInfo,
    endpoint: Endpoint,
    reported: Option<UsageCost>,
) {
    let cost = reported.map(|c| c.0).unwrap_or_else(|| endpoint.base_cost());
    tracker.record(&client.fingerprint, endpoint, cost);
    debug!(
        key_prefix = %client.key_prefix,
        endpoint = %endpoint,
        cost,
        "Usage recorded"
    );
}

/// Extract client IP from request.
///
/// Forwarding headers are client-controlled, so they are only honoured when
/// the connection comes from one of `trusted_proxies`; otherwise the peer
/// address is the client.
pub fn extract_client_ip(req: &ServiceRequest, trusted_proxies: &[IpAddr]) -> Option<IpAddr> {
    let peer = req.peer_addr().map(|addr| addr.ip());
    if !peer.is_some_and(|ip| trusted_proxies.contains(&ip)) {
        return peer;
    }

    // X-Forwarded-For may contain multiple IPs, take the first (client)
    if let Some(forwarded) = req.headers().get("X-Forwarded-For") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            if let Some(first_ip) = forwarded_str.split(',').next() {
                if let Ok(ip) = first_ip.trim().parse::<IpAddr>() {
                    return Some(ip);
                }
            }
        }
    }

    if let Some(real_ip) = req.headers().get("X-Real-IP") {
        if let Ok(ip_str) = real_ip.to_str() {
            if let Ok(ip) = ip_str.trim().parse::<IpAddr>() {
                return Some(ip);
            }
        }
    }

    peer
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::KeyStore;
    use actix_web::test::TestRequest;

    fn proxy() -> Vec<IpAddr> {
        vec!["10.0.0.2".parse().unwrap()]
    }

    #[test]
    fn test_forwarded_for_first_hop_behind_trusted_proxy() {
        let req = TestRequest::get()
            .peer_addr("10.0.0.2:5000".parse().unwrap())
            .insert_header(("X-Forwarded-For", "203.0.113.7, 10.0.0.1"))
            .insert_header(("X-Real-IP", "198.51.100.2"))
            .to_srv_request();
        assert_eq!(extract_client_ip(&req, &proxy()), Some("203.0.113.7".parse().unwrap()));

        let req = TestRequest::get()
            .peer_addr("10.0.0.2:5000".parse().unwrap())
            .insert_header(("X-Real-IP", "198.51.100.2"))
            .to_srv_request();
        assert_eq!(extract_client_ip(&req, &proxy()), Some("198.51.100.2".parse().unwrap()));
    }

    #[test]
    fn test_forwarded_headers_ignored_from_untrusted_peer() {
        let req = TestRequest::get()
            .peer_addr("192.0.2.9:4000".parse().unwrap())
            .insert_header(("X-Forwarded-For", "203.0.113.7"))
            .insert_header(("X-Real-IP", "198.51.100.2"))
            .to_srv_request();
        assert_eq!(extract_client_ip(&req, &proxy()), Some("192.0.2.9".parse().unwrap()));
        assert_eq!(extract_client_ip(&req, &[]), Some("192.0.2.9".parse().unwrap()));

        let req = TestRequest::get()
            .insert_header(("X-Forwarded-For", "203.0.113.7"))
            .to_srv_request();
        assert_eq!(extract_client_ip(&req, &proxy()), None);
    }

    #[test]
    fn test_reported_cost_overrides_base_cost() {
        let keys = KeyStore::new();
        let key = keys.issue("web");
        let client = keys.validate(&key).unwrap();
        let tracker = UsageTracker::new();

        record_usage(&tracker, &client, Endpoint::GenerateQuestions, Some(UsageCost(7)));
        record_usage(&tracker, &client, Endpoint::UploadPdf, None);

        let report = tracker.report(&client.fingerprint);
        assert_eq!(report.endpoints["generate_questions"], 7);
        assert_eq!(report.endpoints["upload_pdf"], 5);
    }

    #[test]
    fn test_with_cost_sets_extension() {
        let resp = with_cost(HttpResponse::Ok().finish(), 9);
        assert_eq!(resp.extensions().get::<UsageCost>(), Some(&UsageCost(9)));
    }
}
