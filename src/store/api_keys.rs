//! API key store
//!
//! Keys are held in memory, indexed by the SHA-256 fingerprint of the token.
//! The plaintext token is only ever returned once, at issue time.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

/// Prefix carried by every token this service issues
pub const API_KEY_PREFIX: &str = "pdt_";

/// Demo key registered in development mode when nothing else is configured
pub const DEVELOPMENT_KEY: &str = "pdt_demo_12345";

/// Number of leading characters safe to show in logs
const KEY_PREFIX_LEN: usize = 12;

/// Random bytes per issued token
const KEY_BYTES: usize = 32;

/// Highest `API_KEY_<i>` slot read from the environment
const ENV_KEY_SLOTS: usize = 10;

/// What a key is allowed to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyRole {
    Client,
    Admin,
}

impl KeyRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyRole::Client => "client",
            KeyRole::Admin => "admin",
        }
    }
}

/// Stored record for an issued key
#[derive(Debug, Clone)]
pub struct ApiKeyRecord {
    pub fingerprint: String,
    pub key_prefix: String,
    pub client_name: String,
    pub role: KeyRole,
    pub created_at: DateTime<Utc>,
}

/// Identity resolved from a valid key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub fingerprint: String,
    pub key_prefix: String,
    pub client_name: String,
    pub role: KeyRole,
    pub created_at: DateTime<Utc>,
}

impl From<&ApiKeyRecord> for ClientInfo {
    fn from(record: &ApiKeyRecord) -> Self {
        Self {
            fingerprint: record.fingerprint.clone(),
            key_prefix: record.key_prefix.clone(),
            client_name: record.client_name.clone(),
            role: record.role,
            created_at: record.created_at,
        }
    }
}

/// Hash an API key using SHA-256
pub fn fingerprint(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Loggable head of a token, never the full secret
pub fn key_prefix(key: &str) -> String {
    key.chars().take(KEY_PREFIX_LEN).collect()
}

/// In-memory API key store
#[derive(Debug, Default)]
pub struct KeyStore {
    keys: DashMap<String, ApiKeyRecord>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the store from `API_KEY_<i>` / `API_KEY_<i>_NAME` and `ADMIN_API_KEY`.
    ///
    /// In development mode with no configured keys, the demo admin key is
    /// registered instead.
    pub fn from_env(development: bool) -> Self {
        let store = Self::new();

        for i in 0..ENV_KEY_SLOTS {
            if let Ok(key) = std::env::var(format!("API_KEY_{}", i)) {
                if key.is_empty() {
                    continue;
                }
                let name = std::env::var(format!("API_KEY_{}_NAME", i))
                    .unwrap_or_else(|_| format!("client_{}", i));
                store.insert(&key, &name, KeyRole::Client);
            }
        }

        if let Ok(key) = std::env::var("ADMIN_API_KEY") {
            if !key.is_empty() {
                store.insert(&key, "admin", KeyRole::Admin);
            }
        }

        if store.is_empty() && development {
            store.insert(DEVELOPMENT_KEY, "development", KeyRole::Admin);
            warn!(key = DEVELOPMENT_KEY, "Development API key registered");
        }

        info!(keys = store.len(), "API key store initialized");
        store
    }

    /// Generate a new API key
    /// Format: pdt_<32 random bytes, URL-safe base64>
    fn generate_api_key() -> String {
        let mut bytes = [0u8; KEY_BYTES];
        OsRng.fill_bytes(&mut bytes);
        format!("{}{}", API_KEY_PREFIX, URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Issue a client key
    pub fn issue(&self, client_name: &str) -> String {
        self.issue_with_role(client_name, KeyRole::Client)
    }

    /// Issue a key with an explicit role. The token is returned only here.
    pub fn issue_with_role(&self, client_name: &str, role: KeyRole) -> String {
        loop {
            let key = Self::generate_api_key();
            let fp = fingerprint(&key);
            // A collision is astronomically unlikely; never overwrite if it happens.
            if let dashmap::mapref::entry::Entry::Vacant(slot) = self.keys.entry(fp.clone()) {
                let record = ApiKeyRecord {
                    fingerprint: fp,
                    key_prefix: key_prefix(&key),
                    client_name: client_name.to_string(),
                    role,
                    created_at: Utc::now(),
                };
                info!(
                    key_prefix = %record.key_prefix,
                    client = %record.client_name,
                    role = role.as_str(),
                    "Issued new API key"
                );
                slot.insert(record);
                return key;
            }
        }
    }

    /// Register a pre-shared token. Returns false if it was already present.
    pub fn insert(&self, key: &str, client_name: &str, role: KeyRole) -> bool {
        let fp = fingerprint(key);
        if self.keys.contains_key(&fp) {
            return false;
        }
        self.keys.insert(
            fp.clone(),
            ApiKeyRecord {
                fingerprint: fp,
                key_prefix: key_prefix(key),
                client_name: client_name.to_string(),
                role,
                created_at: Utc::now(),
            },
        );
        true
    }

    /// Look up a token and return the client behind it
    pub fn validate(&self, key: &str) -> Option<ClientInfo> {
        self.keys.get(&fingerprint(key)).map(|r| ClientInfo::from(r.value()))
    }

    /// Revoke a key by removing it from the store
    pub fn revoke(&self, key: &str) -> bool {
        match self.keys.remove(&fingerprint(key)) {
            Some((_, record)) => {
                warn!(key_prefix = %record.key_prefix, client = %record.client_name, "API key revoked");
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_issue_and_validate() {
        let store = KeyStore::new();
        let key = store.issue("mobile_app");

        assert!(key.starts_with(API_KEY_PREFIX));
        // 32 bytes -> 43 base64 chars without padding
        assert_eq!(key.len(), API_KEY_PREFIX.len() + 43);

        let info = store.validate(&key).expect("issued key must validate");
        assert_eq!(info.client_name, "mobile_app");
        assert_eq!(info.role, KeyRole::Client);
        assert_eq!(info.key_prefix, &key[..12]);
        assert_eq!(info.fingerprint, fingerprint(&key));
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let store = KeyStore::new();
        store.issue("web");
        assert!(store.validate("pdt_not_a_real_key").is_none());
        assert!(store.validate("").is_none());
    }

    #[test]
    fn test_issued_keys_are_unique() {
        let store = KeyStore::new();
        let keys: HashSet<String> = (0..500).map(|i| store.issue(&format!("c{}", i))).collect();
        assert_eq!(keys.len(), 500);
        assert_eq!(store.len(), 500);
    }

    #[test]
    fn test_revoke_removes_key() {
        let store = KeyStore::new();
        let key = store.issue("temp");
        assert!(store.revoke(&key));
        assert!(store.validate(&key).is_none());
        assert!(!store.revoke(&key));
    }

    #[test]
    fn test_insert_preshared_key() {
        let store = KeyStore::new();
        assert!(store.insert("pdt_shared", "partner", KeyRole::Admin));
        assert!(!store.insert("pdt_shared", "other", KeyRole::Client));

        let info = store.validate("pdt_shared").unwrap();
        assert_eq!(info.client_name, "partner");
        assert_eq!(info.role, KeyRole::Admin);
    }

    #[test]
    fn test_fingerprint_is_stable_hex() {
        let fp = fingerprint("pdt_abc");
        assert_eq!(fp.len(), 64);
        assert_eq!(fp, fingerprint("pdt_abc"));
        assert_ne!(fp, fingerprint("pdt_abd"));
    }
}
