//! OpenAPI 3.0 specification definition

use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::api::error::ErrorBody;
use crate::api::handlers::{
    admin::{GenerateKeyResponse, RevokeKeyResponse, UsageReportResponse},
    health::{BannerResponse, HealthResponse},
};
use crate::domain::{
    Answer, CollectionsResponse, EvaluationRequest, EvaluationResult, IndexRequest,
    IndexResponse, QuestionRequest, QuestionsResponse, UploadResponse,
};
use crate::store::UsageSummary;

/// Registers the `X-API-Key` header scheme
struct ApiKeySecurity;

impl Modify for ApiKeySecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "api_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("X-API-Key"))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "PDF Tutor API",
        version = "1.0.0",
        description = "Upload and index PDFs, generate study questions and grade answers. \
                       Every endpoint except the banner, docs and /health needs an API key.",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "/", description = "Current server")
    ),
    tags(
        (name = "system", description = "System health and status endpoints"),
        (name = "documents", description = "PDF upload, indexing and collections"),
        (name = "tutoring", description = "Question generation and answer grading"),
        (name = "admin", description = "Usage reports and API key management")
    ),
    paths(
        crate::api::handlers::health::root,
        crate::api::handlers::health::health_check,
        crate::api::handlers::documents::upload_pdf,
        crate::api::handlers::documents::index_pdf,
        crate::api::handlers::documents::list_collections,
        crate::api::handlers::tutoring::generate_questions,
        crate::api::handlers::tutoring::evaluate_answers,
        crate::api::handlers::admin::usage_report,
        crate::api::handlers::admin::generate_api_key,
        crate::api::handlers::admin::revoke_api_key,
    ),
    components(
        schemas(
            BannerResponse,
            HealthResponse,
            ErrorBody,
            UploadResponse,
            IndexRequest,
            IndexResponse,
            CollectionsResponse,
            QuestionRequest,
            QuestionsResponse,
            Answer,
            EvaluationRequest,
            EvaluationResult,
            UsageSummary,
            UsageReportResponse,
            GenerateKeyResponse,
            RevokeKeyResponse,
        )
    ),
    modifiers(&ApiKeySecurity)
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_gateway_routes() {
        let doc = ApiDoc::openapi();
        for path in ["/health", "/upload-pdf", "/generate-questions", "/admin/api-keys/{api_key}"] {
            assert!(doc.paths.paths.contains_key(path), "missing {}", path);
        }
        let schemes = doc.components.unwrap().security_schemes;
        assert!(schemes.contains_key("api_key"));
    }

    #[test]
    fn test_every_schema_is_referenced() {
        let doc = ApiDoc::openapi();
        let json = doc.to_json().unwrap();
        let schemas = doc.components.unwrap().schemas;
        assert!(!schemas.contains_key("Endpoint"));
        assert!(!schemas.contains_key("KeyRole"));
        for name in schemas.keys() {
            let reference = format!("#/components/schemas/{}", name);
            assert!(json.contains(&reference), "{} is registered but unused", name);
        }
    }
}
