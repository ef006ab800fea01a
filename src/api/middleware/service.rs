//! Request Gateway Middleware
//!
//! Actix-web middleware that combines authentication, rate limiting,
//! upload pre-checks and usage tracking into a single service wrapper.
//!
//! Order per guarded request: classify, authenticate (401), authorize admin
//! routes (403), rate limit (429), declared upload size (413), dispatch,
//! record usage on success. Unauthenticated requests never reach the
//! limiter. Security headers are added by an outer `DefaultHeaders` layer
//! so rejections carry them too.

use actix_web::{
    body::{BoxBody, EitherBody},
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http::header::CONTENT_LENGTH,
    Error, HttpMessage, ResponseError,
};
use chrono::Utc;
use futures::future::{ok, LocalBoxFuture, Ready};
use std::net::IpAddr;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{error, warn};

use super::auth::{authenticate, extract_api_key, CredentialStrategy, DEFAULT_STRATEGIES};
use super::rate_limit::{add_rate_limit_headers, rate_limit_exceeded};
use super::usage::{extract_client_ip, record_usage, UsageCost};
use crate::api::error::ApiError;
use crate::api::validation::check_size;
use crate::domain::Endpoint;
use crate::store::{KeyRole, KeyStore, RateDecision, RateLimiter, UsageTracker};

/// Bytes of boundaries and part headers tolerated on top of the file limit
/// when judging a declared `Content-Length`
pub const MULTIPART_ENVELOPE_ALLOWANCE: u64 = 64 * 1024;

/// Shared state the gateway needs on every request
#[derive(Clone)]
pub struct GatewayContext {
    pub keys: Arc<KeyStore>,
    pub limiter: RateLimiter,
    pub usage: Arc<UsageTracker>,
    pub max_upload_bytes: u64,
    /// When false requests pass straight through
    pub enabled: bool,
    pub strategies: Vec<CredentialStrategy>,
    /// Peers whose forwarding headers name the real client
    pub trusted_proxies: Vec<IpAddr>,
}

impl GatewayContext {
    pub fn new(
        keys: Arc<KeyStore>,
        limiter: RateLimiter,
        usage: Arc<UsageTracker>,
        max_upload_bytes: u64,
        enabled: bool,
        trusted_proxies: Vec<IpAddr>,
    ) -> Self {
        Self {
            keys,
            limiter,
            usage,
            max_upload_bytes,
            enabled,
            strategies: DEFAULT_STRATEGIES.to_vec(),
            trusted_proxies,
        }
    }
}

/// Middleware factory for the request gateway
pub struct GatewayMiddleware {
    ctx: GatewayContext,
}

impl GatewayMiddleware {
    pub fn new(ctx: GatewayContext) -> Self {
        Self { ctx }
    }
}

impl<S, B> Transform<S, ServiceRequest> for GatewayMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B, BoxBody>>;
    type Error = Error;
    type Transform = GatewayMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(GatewayMiddlewareService {
            service: Rc::new(service),
            ctx: self.ctx.clone(),
        })
    }
}

/// The actual middleware service
pub struct GatewayMiddlewareService<S> {
    service: Rc<S>,
    ctx: GatewayContext,
}

fn reject<B>(req: ServiceRequest, err: ApiError) -> ServiceResponse<EitherBody<B, BoxBody>> {
    req.into_response(err.error_response()).map_into_right_body()
}

fn declared_length(req: &ServiceRequest) -> Option<u64> {
    req.headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

impl<S, B> Service<ServiceRequest> for GatewayMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B, BoxBody>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, ctx: &mut core::task::Context<'_>) -> core::task::Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let ctx = self.ctx.clone();
        let endpoint = Endpoint::classify(req.method(), req.path());

        Box::pin(async move {
            // Banner, docs, unknown routes, or gateway disabled
            let endpoint = match endpoint {
                Some(endpoint) if ctx.enabled => endpoint,
                _ => {
                    let res = service.call(req).await?;
                    return Ok(res.map_into_left_body());
                }
            };

            let now = Utc::now();
            let ip = extract_client_ip(&req, &ctx.trusted_proxies).map(|ip| ip.to_string());

            if endpoint.is_public() {
                let subject = format!("ip:{}", ip.as_deref().unwrap_or("unknown"));
                let decision = match check(&ctx.limiter, &subject, endpoint, now).await {
                    Ok(decision) => decision,
                    Err(err) => return Ok(reject(req, err)),
                };
                if !decision.allowed {
                    let err = rate_limit_exceeded(&decision, endpoint, &subject, now);
                    return Ok(reject(req, err));
                }

                let mut res = service.call(req).await?.map_into_left_body();
                add_rate_limit_headers(res.headers_mut(), &decision);
                return Ok(res);
            }

            let api_key = match extract_api_key(&req, &ctx.strategies) {
                Some(key) => key,
                None => {
                    warn!(
                        target: "security",
                        event = "missing_api_key",
                        endpoint = %endpoint,
                        ip = ip.as_deref().unwrap_or("unknown"),
                        "Request without API key"
                    );
                    return Ok(reject(req, ApiError::MissingCredential));
                }
            };

            let client = match authenticate(&ctx.keys, &api_key, ip.as_deref()) {
                Ok(client) => client,
                Err(err) => return Ok(reject(req, err)),
            };

            if endpoint.requires_admin() && client.role != KeyRole::Admin {
                warn!(
                    target: "security",
                    event = "admin_access_denied",
                    key_prefix = %client.key_prefix,
                    client = %client.client_name,
                    endpoint = %endpoint,
                    "Non-admin key on admin endpoint"
                );
                return Ok(reject(req, ApiError::Forbidden));
            }

            let decision = match check(&ctx.limiter, &client.fingerprint, endpoint, now).await {
                Ok(decision) => decision,
                Err(err) => return Ok(reject(req, err)),
            };
            if !decision.allowed {
                let label = format!("{} ({})", client.client_name, client.key_prefix);
                let err = rate_limit_exceeded(&decision, endpoint, &label, now);
                return Ok(reject(req, err));
            }

            if endpoint.accepts_file() {
                if let Some(length) = declared_length(&req) {
                    // Content-Length covers the multipart envelope too; exact
                    // file size is enforced while streaming.
                    let file_bound = length.saturating_sub(MULTIPART_ENVELOPE_ALLOWANCE);
                    if let Err(rejection) = check_size(file_bound, ctx.max_upload_bytes) {
                        warn!(
                            target: "security",
                            event = "upload_too_large",
                            key_prefix = %client.key_prefix,
                            declared_bytes = length,
                            "Upload rejected before reading body"
                        );
                        return Ok(reject(req, rejection.into()));
                    }
                }
            }

            req.extensions_mut().insert(client.clone());

            let res = service.call(req).await?;

            if res.status().is_success() {
                let reported = res.response().extensions().get::<UsageCost>().copied();
                record_usage(&ctx.usage, &client, endpoint, reported);
            }

            let mut res = res.map_into_left_body();
            add_rate_limit_headers(res.headers_mut(), &decision);
            Ok(res)
        })
    }
}

async fn check(
    limiter: &RateLimiter,
    subject: &str,
    endpoint: Endpoint,
    now: chrono::DateTime<Utc>,
) -> Result<RateDecision, ApiError> {
    limiter.check_at(subject, endpoint, now).await.map_err(|e| {
        error!(error = %e, backend = limiter.backend_name(), "Rate limit backend failed");
        ApiError::Unavailable("Rate limiting service unavailable".to_string())
    })
}
