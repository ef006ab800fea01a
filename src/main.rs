//! PDF Tutor Gateway
//!
//! Secured tutoring API on Actix-Web: upload and index PDFs, generate study
//! questions and grade free-text answers with an LLM. Every call goes through
//! an API-key gateway with per-endpoint sliding-window rate limits and usage
//! accounting.

use actix_cors::Cors;
use actix_web::{http::header, middleware, web, App, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod domain;
mod providers;
mod store;
mod tutor;

use crate::api::middleware::{GatewayContext, GatewayMiddleware};
use crate::config::Settings;
use crate::providers::OpenAiProvider;
use crate::store::{KeyStore, RateLimiter, RedisBackend, UsageTracker};
use crate::tutor::{PdftotextExtractor, TutorService, VectorStore};

/// How often expired rate-limit windows are dropped
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Application state shared across all handlers
pub struct AppState {
    pub settings: Settings,
    pub keys: Arc<KeyStore>,
    pub usage: Arc<UsageTracker>,
    pub collections: VectorStore,
    /// Absent when no LLM provider is configured
    pub tutor: Option<Arc<TutorService>>,
}

impl AppState {
    /// Gateway view of the shared security state
    pub fn gateway_context(&self, limiter: RateLimiter) -> GatewayContext {
        GatewayContext::new(
            self.keys.clone(),
            limiter,
            self.usage.clone(),
            self.settings.security.max_upload_bytes(),
            self.settings.security.enabled,
            self.settings.security.trusted_proxy_ips(),
        )
    }
}

async fn build_rate_limiter(settings: &Settings) -> RateLimiter {
    if settings.redis.url.is_empty() {
        info!("No Redis URL configured, rate limit state is in-memory only");
        return RateLimiter::in_memory();
    }

    match RedisBackend::connect(&settings.redis.url).await {
        Ok(backend) => RateLimiter::new(Arc::new(backend)),
        Err(e) => {
            warn!("Redis unavailable: {}. Falling back to in-memory rate limits.", e);
            RateLimiter::in_memory()
        }
    }
}

fn build_tutor(settings: &Settings, collections: VectorStore) -> Option<Arc<TutorService>> {
    match OpenAiProvider::new(&settings.llm) {
        Ok(provider) => {
            let provider = Arc::new(provider);
            info!(model = %settings.llm.chat_model, "LLM provider initialized");
            Some(Arc::new(TutorService::new(
                provider.clone(),
                provider,
                Arc::new(PdftotextExtractor::default()),
                collections,
                settings.storage.upload_dir.clone(),
            )))
        }
        Err(e) => {
            warn!("Tutoring services disabled: {}", e);
            None
        }
    }
}

fn cors(allowed_origins: &[String]) -> Cors {
    let mut cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "DELETE"])
        .allowed_headers(vec![
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::HeaderName::from_static("x-api-key"),
        ])
        .expose_headers(vec![
            header::HeaderName::from_static("x-ratelimit-limit"),
            header::HeaderName::from_static("x-ratelimit-remaining"),
            header::HeaderName::from_static("x-ratelimit-reset"),
            header::RETRY_AFTER,
        ])
        .max_age(3600);

    for origin in allowed_origins {
        cors = cors.allowed_origin(origin);
    }
    cors
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing subscriber for structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("pdf_tutor_gateway=info,security=info,actix_web=info")),
        )
        .json()
        .init();

    let settings = Settings::load().context("Failed to load configuration")?;
    let bind_addr = format!("{}:{}", settings.server.host, settings.server.port);

    info!(
        "Starting PDF Tutor Gateway v{} on {}",
        env!("CARGO_PKG_VERSION"),
        bind_addr
    );

    tokio::fs::create_dir_all(&settings.storage.upload_dir)
        .await
        .with_context(|| format!("Failed to create {}", settings.storage.upload_dir.display()))?;
    tokio::fs::create_dir_all(&settings.storage.vectorstore_dir)
        .await
        .with_context(|| format!("Failed to create {}", settings.storage.vectorstore_dir.display()))?;

    if !settings.security.enabled {
        warn!("Security gateway disabled: no authentication or rate limiting");
    }

    let keys = Arc::new(KeyStore::from_env(settings.security.development));
    let limiter = build_rate_limiter(&settings).await;
    let collections = VectorStore::new(settings.storage.vectorstore_dir.clone());
    let tutor = build_tutor(&settings, collections.clone());

    // Drop windows whose entries have all expired
    let purge_limiter = limiter.clone();
    actix_rt::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            match purge_limiter.purge_expired().await {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(removed, "Purged expired rate limit windows"),
                Err(e) => warn!(error = %e, "Rate limit purge failed"),
            }
        }
    });

    let workers = settings.server.workers.unwrap_or_else(|| num_cpus::get() * 2);
    let allowed_origins = settings.security.allowed_origins.clone();

    let app_state = web::Data::new(AppState {
        settings,
        keys,
        usage: Arc::new(UsageTracker::new()),
        collections,
        tutor,
    });
    let gateway = app_state.gateway_context(limiter);

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            // Auth, rate limiting, upload pre-checks, usage
            .wrap(GatewayMiddleware::new(gateway.clone()))
            // Middleware (order matters - these wrap around the gateway)
            .wrap(cors(&allowed_origins))
            .wrap(TracingLogger::default())
            .wrap(middleware::Compress::default())
            .wrap(api::security_headers())
            .configure(api::configure_routes)
    })
    .workers(workers)
    .bind(&bind_addr)
    .with_context(|| format!("Failed to bind {}", bind_addr))?
    .run()
    .await?;

    Ok(())
}
