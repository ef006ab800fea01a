//! API Key Authentication
//!
//! Credentials are read through an ordered list of strategies; the first
//! one that yields a non-empty value wins. Authenticated client info is
//! stored in request extensions for downstream handlers.

use actix_web::{dev::ServiceRequest, HttpMessage};
use tracing::{debug, warn};

use crate::api::error::ApiError;
use crate::store::{ClientInfo, KeyStore};

/// Header name for API key
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Query parameter name for API key
pub const API_KEY_QUERY: &str = "api_key";

/// One way of carrying an API key on a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialStrategy {
    Header(&'static str),
    Query(&'static str),
}

/// Header first, then query string
pub const DEFAULT_STRATEGIES: [CredentialStrategy; 2] = [
    CredentialStrategy::Header(API_KEY_HEADER),
    CredentialStrategy::Query(API_KEY_QUERY),
];

impl CredentialStrategy {
    pub fn extract(&self, req: &ServiceRequest) -> Option<String> {
        let value = match self {
            CredentialStrategy::Header(name) => req
                .headers()
                .get(*name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim().to_string()),
            CredentialStrategy::Query(name) => url::form_urlencoded::parse(req.query_string().as_bytes())
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.trim().to_string()),
        };
        value.filter(|v| !v.is_empty())
    }
}

/// Extract API key using `strategies` in order
pub fn extract_api_key(req: &ServiceRequest, strategies: &[CredentialStrategy]) -> Option<String> {
    strategies.iter().find_map(|s| s.extract(req))
}

/// Resolve a presented key to its client
pub fn authenticate(keys: &KeyStore, api_key: &str, ip: Option<&str>) -> Result<ClientInfo, ApiError> {
    match keys.validate(api_key) {
        Some(client) => {
            debug!(
                key_prefix = %client.key_prefix,
                client = %client.client_name,
                "API key validated"
            );
            Ok(client)
        }
        None => {
            warn!(
                target: "security",
                event = "invalid_api_key",
                key_prefix = %crate::store::key_prefix(api_key),
                ip = ip.unwrap_or("unknown"),
                "Invalid API key"
            );
            Err(ApiError::InvalidCredential)
        }
    }
}

/// Access to the authenticated client from handlers
pub trait ClientExt {
    fn client(&self) -> Option<ClientInfo>;
}

impl<T: HttpMessage> ClientExt for T {
    fn client(&self) -> Option<ClientInfo> {
        self.extensions().get::<ClientInfo>().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_header_wins_over_query() {
        let req = TestRequest::get()
            .uri("/collections?api_key=pdt_from_query")
            .insert_header((API_KEY_HEADER, "pdt_from_header"))
            .to_srv_request();
        assert_eq!(
            extract_api_key(&req, &DEFAULT_STRATEGIES).as_deref(),
            Some("pdt_from_header")
        );
    }

    #[test]
    fn test_query_fallback_is_decoded() {
        let req = TestRequest::get()
            .uri("/collections?x=1&api_key=pdt_a%2Db")
            .to_srv_request();
        assert_eq!(extract_api_key(&req, &DEFAULT_STRATEGIES).as_deref(), Some("pdt_a-b"));
    }

    #[test]
    fn test_empty_values_are_absent() {
        let req = TestRequest::get()
            .uri("/collections?api_key=")
            .insert_header((API_KEY_HEADER, "  "))
            .to_srv_request();
        assert_eq!(extract_api_key(&req, &DEFAULT_STRATEGIES), None);
    }

    #[test]
    fn test_strategy_order_is_respected() {
        let req = TestRequest::get()
            .uri("/collections?api_key=pdt_q")
            .insert_header((API_KEY_HEADER, "pdt_h"))
            .to_srv_request();
        let query_first = [
            CredentialStrategy::Query(API_KEY_QUERY),
            CredentialStrategy::Header(API_KEY_HEADER),
        ];
        assert_eq!(extract_api_key(&req, &query_first).as_deref(), Some("pdt_q"));
    }

    #[test]
    fn test_authenticate_unknown_key() {
        let keys = KeyStore::new();
        assert!(matches!(
            authenticate(&keys, "pdt_nope", None),
            Err(ApiError::InvalidCredential)
        ));
        let key = keys.issue("mobile_app");
        assert_eq!(authenticate(&keys, &key, None).unwrap().client_name, "mobile_app");
    }
}
