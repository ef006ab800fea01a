//! API Key Management Handlers
//!
//! Admin endpoints for usage reports and key issue/revocation. The gateway
//! only lets admin keys through to these handlers.

use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::api::error::{ApiError, ErrorBody};
use crate::api::middleware::ClientExt;
use crate::store::{fingerprint, key_prefix, UsageSummary};
use crate::AppState;

/// Usage report for one key
#[derive(Debug, Serialize, ToSchema)]
pub struct UsageReportResponse {
    /// First characters of the key; the full token is never echoed
    pub key_prefix: String,
    /// Client name if the key is still active
    pub client_name: Option<String>,
    pub usage: UsageSummary,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct GenerateKeyQuery {
    /// Client name for the new key
    pub name: String,
}

/// Response after creating a new API key
#[derive(Debug, Serialize, ToSchema)]
pub struct GenerateKeyResponse {
    /// Only shown once
    pub api_key: String,
    pub name: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RevokeKeyResponse {
    pub key_prefix: String,
    pub revoked: bool,
}

fn requested_by(req: &HttpRequest) -> String {
    req.client()
        .map(|c| c.key_prefix)
        .unwrap_or_else(|| "anonymous".to_string())
}

/// GET /admin/usage/{api_key} - Usage report for a key
#[utoipa::path(
    get,
    path = "/admin/usage/{api_key}",
    tag = "admin",
    params(("api_key" = String, Path, description = "Key to report on")),
    responses(
        (status = 200, description = "Usage report", body = UsageReportResponse),
        (status = 403, description = "Admin key required", body = ErrorBody)
    ),
    security(("api_key" = []))
)]
pub async fn usage_report(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let api_key = path.into_inner();
    let usage = state.usage.report(&fingerprint(&api_key));
    let client_name = state.keys.validate(&api_key).map(|c| c.client_name);

    Ok(HttpResponse::Ok().json(UsageReportResponse {
        key_prefix: key_prefix(&api_key),
        client_name,
        usage,
    }))
}

/// POST /admin/generate-api-key?name= - Issue a client key
#[utoipa::path(
    post,
    path = "/admin/generate-api-key",
    tag = "admin",
    params(GenerateKeyQuery),
    responses(
        (status = 200, description = "Key issued", body = GenerateKeyResponse),
        (status = 400, description = "Invalid name", body = ErrorBody),
        (status = 403, description = "Admin key required", body = ErrorBody)
    ),
    security(("api_key" = []))
)]
pub async fn generate_api_key(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<GenerateKeyQuery>,
) -> Result<HttpResponse, ApiError> {
    let name = query.name.trim();
    if name.is_empty() || name.chars().count() > 100 {
        return Err(ApiError::BadRequest(
            "name must be between 1 and 100 characters".to_string(),
        ));
    }

    let api_key = state.keys.issue(name);

    info!(
        target: "security",
        event = "api_key_issued",
        key_prefix = %key_prefix(&api_key),
        client = %name,
        issued_by = %requested_by(&req),
        "API key created"
    );

    Ok(HttpResponse::Ok().json(GenerateKeyResponse {
        api_key,
        name: name.to_string(),
    }))
}

/// DELETE /admin/api-keys/{api_key} - Revoke a key
#[utoipa::path(
    delete,
    path = "/admin/api-keys/{api_key}",
    tag = "admin",
    params(("api_key" = String, Path, description = "Key to revoke")),
    responses(
        (status = 200, description = "Key revoked", body = RevokeKeyResponse),
        (status = 404, description = "Unknown key", body = ErrorBody),
        (status = 403, description = "Admin key required", body = ErrorBody)
    ),
    security(("api_key" = []))
)]
pub async fn revoke_api_key(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let api_key = path.into_inner();
    let prefix = key_prefix(&api_key);

    if !state.keys.revoke(&api_key) {
        return Err(ApiError::NotFound("API key not found".to_string()));
    }

    info!(
        target: "security",
        event = "api_key_revoked",
        key_prefix = %prefix,
        revoked_by = %requested_by(&req),
        "API key revoked"
    );

    Ok(HttpResponse::Ok().json(RevokeKeyResponse {
        key_prefix: prefix,
        revoked: true,
    }))
}
