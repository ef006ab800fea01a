//! API module - HTTP routes and handlers

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod validation;

use actix_web::{error::JsonPayloadError, error::PathError, error::QueryPayloadError};
use actix_web::{middleware::DefaultHeaders, web, HttpRequest};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::error::ApiError;
use crate::api::openapi::ApiDoc;

/// Headers attached to every response, rejections included
pub fn security_headers() -> DefaultHeaders {
    DefaultHeaders::new()
        .add(("X-Content-Type-Options", "nosniff"))
        .add(("X-Frame-Options", "DENY"))
        .add(("X-XSS-Protection", "1; mode=block"))
        .add(("Strict-Transport-Security", "max-age=31536000"))
}

fn json_error(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    ApiError::BadRequest(format!("Invalid JSON body: {}", err)).into()
}

fn query_error(err: QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    ApiError::BadRequest(format!("Invalid query string: {}", err)).into()
}

fn path_error(err: PathError, _req: &HttpRequest) -> actix_web::Error {
    ApiError::BadRequest(format!("Invalid path: {}", err)).into()
}

/// Configure all API routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error))
        .app_data(web::QueryConfig::default().error_handler(query_error))
        .app_data(web::PathConfig::default().error_handler(path_error));

    cfg.route("/", web::get().to(handlers::health::root))
        .route("/health", web::get().to(handlers::health::health_check))
        .route("/upload-pdf", web::post().to(handlers::documents::upload_pdf))
        .route("/index-pdf/{filename}", web::post().to(handlers::documents::index_pdf))
        .route("/collections", web::get().to(handlers::documents::list_collections))
        .route("/generate-questions", web::post().to(handlers::tutoring::generate_questions))
        .route("/evaluate-answers", web::post().to(handlers::tutoring::evaluate_answers))
        .service(
            web::scope("/admin")
                .route("/usage/{api_key}", web::get().to(handlers::admin::usage_report))
                .route("/generate-api-key", web::post().to(handlers::admin::generate_api_key))
                .route("/api-keys/{api_key}", web::delete().to(handlers::admin::revoke_api_key))
        )
        // Swagger UI and OpenAPI spec
        .service(
            SwaggerUi::new("/swagger-ui/{_:.*}")
                .url("/api-docs/openapi.json", ApiDoc::openapi())
        );
}
