//! Configuration module for the tutoring gateway

use serde::Deserialize;
use config::{Config, ConfigError, Environment, File};
use std::net::IpAddr;
use std::path::PathBuf;
use tracing::warn;

/// Main application settings
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub security: SecuritySettings,
    pub storage: StorageSettings,
    pub llm: LlmSettings,
    #[serde(default)]
    pub redis: RedisSettings,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

/// API key, rate limiting and upload policy
#[derive(Debug, Clone, Deserialize)]
pub struct SecuritySettings {
    /// When false the gateway only attaches security headers
    pub enabled: bool,
    /// Registers the demo key when no keys are configured
    #[serde(default)]
    pub development: bool,
    pub allowed_origins: Vec<String>,
    pub max_upload_mb: u64,
    /// Reverse proxies allowed to set `X-Forwarded-For` / `X-Real-IP`
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
}

impl SecuritySettings {
    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_mb * 1024 * 1024
    }

    /// Parsed proxy addresses; unparseable entries are logged and skipped
    pub fn trusted_proxy_ips(&self) -> Vec<IpAddr> {
        self.trusted_proxies
            .iter()
            .filter_map(|raw| match raw.trim().parse() {
                Ok(ip) => Some(ip),
                Err(_) => {
                    warn!(proxy = %raw, "Ignoring invalid trusted proxy address");
                    None
                }
            })
            .collect()
    }
}

/// Where uploads and vector-store collections live on disk
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    pub upload_dir: PathBuf,
    pub vectorstore_dir: PathBuf,
}

/// OpenAI-compatible LLM and embedding provider
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSettings {
    #[serde(default)]
    pub api_key: String,
    pub base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub temperature: f32,
    pub requests_per_minute: u32,
    pub timeout_secs: u64,
}

impl LlmSettings {
    /// Configured key, falling back to the conventional OPENAI_API_KEY variable
    pub fn resolved_api_key(&self) -> Option<String> {
        if !self.api_key.is_empty() {
            return Some(self.api_key.clone());
        }
        std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty())
    }
}

/// Optional shared store for rate-limit windows
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RedisSettings {
    #[serde(default)]
    pub url: String,
}

impl Settings {
    /// Load configuration from files and environment variables
    ///
    /// Configuration priority (highest to lowest):
    /// 1. Environment variables (prefixed with PDFTUTOR_)
    /// 2. config/local.toml (gitignored)
    /// 3. config/default.toml
    pub fn load() -> Result<Self, ConfigError> {
        let config_dir = std::env::var("CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"));

        let defaults = Settings::default();

        let builder = Config::builder()
            .set_default("server.host", defaults.server.host)?
            .set_default("server.port", defaults.server.port as i64)?
            .set_default("security.enabled", defaults.security.enabled)?
            .set_default("security.development", defaults.security.development)?
            .set_default("security.allowed_origins", defaults.security.allowed_origins)?
            .set_default("security.max_upload_mb", defaults.security.max_upload_mb as i64)?
            .set_default("storage.upload_dir", defaults.storage.upload_dir.to_string_lossy().to_string())?
            .set_default("storage.vectorstore_dir", defaults.storage.vectorstore_dir.to_string_lossy().to_string())?
            .set_default("llm.base_url", defaults.llm.base_url)?
            .set_default("llm.chat_model", defaults.llm.chat_model)?
            .set_default("llm.embedding_model", defaults.llm.embedding_model)?
            .set_default("llm.temperature", defaults.llm.temperature as f64)?
            .set_default("llm.requests_per_minute", defaults.llm.requests_per_minute as i64)?
            .set_default("llm.timeout_secs", defaults.llm.timeout_secs as i64)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Local overrides (gitignored)
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            // PDFTUTOR_SERVER__PORT, PDFTUTOR_SECURITY__ALLOWED_ORIGINS, etc.
            .add_source(
                Environment::with_prefix("PDFTUTOR")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("security.allowed_origins")
                    .with_list_parse_key("security.trusted_proxies")
                    .try_parsing(true)
            );

        builder.build()?.try_deserialize()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            server: ServerSettings {
                host: "0.0.0.0".to_string(),
                port: 8000,
                workers: None,
            },
            security: SecuritySettings {
                enabled: true,
                development: false,
                allowed_origins: vec![
                    "http://localhost:8501".to_string(),
                    "http://127.0.0.1:8501".to_string(),
                ],
                max_upload_mb: 50,
                trusted_proxies: Vec::new(),
            },
            storage: StorageSettings {
                upload_dir: PathBuf::from("uploads"),
                vectorstore_dir: PathBuf::from("vectorstores"),
            },
            llm: LlmSettings {
                api_key: String::new(),
                base_url: "https://api.openai.com/v1".to_string(),
                chat_model: "gpt-4o".to_string(),
                embedding_model: "text-embedding-3-small".to_string(),
                temperature: 0.0,
                requests_per_minute: 60,
                timeout_secs: 120,
            },
            redis: RedisSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_upload_limit_is_fifty_megabytes() {
        let settings = Settings::default();
        assert_eq!(settings.security.max_upload_bytes(), 50 * 1024 * 1024);
    }

    #[test]
    fn test_trusted_proxies_skip_invalid_entries() {
        let mut security = Settings::default().security;
        assert!(security.trusted_proxy_ips().is_empty());

        security.trusted_proxies = vec!["10.0.0.2".into(), " ::1 ".into(), "proxy.local".into()];
        let ips = security.trusted_proxy_ips();
        assert_eq!(ips, vec!["10.0.0.2".parse::<IpAddr>().unwrap(), "::1".parse().unwrap()]);
    }

    #[test]
    fn test_default_llm_is_deterministic() {
        assert_eq!(Settings::default().llm.temperature, 0.0);
    }

    #[test]
    fn test_explicit_llm_key_wins() {
        let mut llm = Settings::default().llm;
        llm.api_key = "sk-configured".to_string();
        assert_eq!(llm.resolved_api_key().as_deref(), Some("sk-configured"));
    }
}
