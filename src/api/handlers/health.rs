//! Banner and health check endpoints

use actix_web::{web, HttpResponse};
use serde::Serialize;
use utoipa::ToSchema;

use crate::AppState;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// Whether an LLM provider key is configured
    pub openai_configured: bool,
    /// Whether the tutoring services are available
    pub services_initialized: bool,
}

#[derive(Serialize, ToSchema)]
pub struct BannerResponse {
    pub message: &'static str,
}

/// GET / - Service banner
#[utoipa::path(
    get,
    path = "/",
    tag = "system",
    responses(
        (status = 200, description = "Service is running", body = BannerResponse)
    )
)]
pub async fn root() -> HttpResponse {
    HttpResponse::Ok().json(BannerResponse {
        message: "PDF Tutor API (Secured) is running",
    })
}

/// GET /health - Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 429, description = "Too many health checks from this IP", body = crate::api::error::ErrorBody)
    )
)]
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let response = HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        openai_configured: state.settings.llm.resolved_api_key().is_some(),
        services_initialized: state.tutor.is_some(),
    };

    HttpResponse::Ok().json(response)
}
