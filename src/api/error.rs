//! HTTP error taxonomy
//!
//! Every rejection renders as `{error, message, status_code}`. Internal
//! detail is logged, never put in the body.

use actix_web::{
    http::{header, StatusCode},
    HttpResponse, ResponseError,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;
use utoipa::ToSchema;

use crate::domain::ValidationError;
use crate::tutor::TutorError;

use super::middleware::rate_limit::{RATE_LIMIT_LIMIT, RATE_LIMIT_REMAINING, RATE_LIMIT_RESET, RETRY_AFTER};

/// Why an uploaded file was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FileRejection {
    #[error("File too large. Maximum size: {max_mb}MB")]
    TooLarge { max_mb: u64 },
    #[error("Invalid PDF file format")]
    BadSignature,
    #[error("Only PDF files are allowed")]
    BadExtension,
    #[error("Invalid filename")]
    BadFilename,
    #[error("No file provided in the 'file' field")]
    Missing,
    #[error("Malformed multipart body")]
    Malformed,
}

/// API errors surfaced to clients
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("API key required. Include 'X-API-Key' header or 'api_key' query parameter.")]
    MissingCredential,

    #[error("Invalid API key")]
    InvalidCredential,

    #[error("Admin privileges required")]
    Forbidden,

    #[error("Rate limit exceeded: {rule}")]
    RateLimited {
        rule: String,
        limit: u32,
        reset_at: i64,
        retry_after_secs: i64,
    },

    #[error("{0}")]
    File(FileRejection),

    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("Internal server error")]
    Internal(String),
}

/// JSON error body
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

impl ApiError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::MissingCredential | ApiError::InvalidCredential => "unauthorized",
            ApiError::Forbidden => "forbidden",
            ApiError::RateLimited { .. } => "rate_limit_exceeded",
            ApiError::File(FileRejection::TooLarge { .. }) => "file_too_large",
            ApiError::File(_) => "invalid_file",
            ApiError::Validation(_) | ApiError::BadRequest(_) => "bad_request",
            ApiError::NotFound(_) => "not_found",
            ApiError::Unavailable(_) => "service_unavailable",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl From<FileRejection> for ApiError {
    fn from(rejection: FileRejection) -> Self {
        ApiError::File(rejection)
    }
}

impl From<TutorError> for ApiError {
    fn from(err: TutorError) -> Self {
        match err {
            TutorError::CollectionNotFound(name) => {
                ApiError::NotFound(format!("Collection '{}' not found", name))
            }
            TutorError::FileNotFound(name) => ApiError::NotFound(format!("File {} not found", name)),
            TutorError::Provider(e) => {
                error!(error = %e, "Upstream provider call failed");
                ApiError::Unavailable("Upstream AI service unavailable".to_string())
            }
            TutorError::Extraction(e) => {
                error!(error = %e, "PDF text extraction failed");
                ApiError::BadRequest("Could not extract text from the PDF".to_string())
            }
            TutorError::EmptyDocument => {
                ApiError::BadRequest("The PDF contains no extractable text".to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MissingCredential | ApiError::InvalidCredential => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::File(FileRejection::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::File(_) | ApiError::Validation(_) | ApiError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();

        if let ApiError::Internal(detail) = self {
            error!(target: "security", event = "server_error", detail = %detail, "Internal error");
        }

        let body = ErrorBody {
            error: self.code().to_string(),
            message: self.to_string(),
            status_code: status.as_u16(),
        };

        let mut builder = HttpResponse::build(status);
        if let ApiError::RateLimited { limit, reset_at, retry_after_secs, .. } = self {
            builder
                .insert_header((RATE_LIMIT_LIMIT, limit.to_string()))
                .insert_header((RATE_LIMIT_REMAINING, "0"))
                .insert_header((RATE_LIMIT_RESET, reset_at.to_string()))
                .insert_header((RETRY_AFTER, retry_after_secs.to_string()));
        }
        builder
            .insert_header((header::CACHE_CONTROL, "no-store"))
            .json(body)
    }
}
