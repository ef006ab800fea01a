//! PDF upload, indexing and collection listing

use actix_multipart::{Field, Multipart};
use actix_web::{web, HttpResponse};
use futures::TryStreamExt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use super::require_tutor;
use crate::api::error::{ApiError, ErrorBody, FileRejection};
use crate::api::validation::{sanitize_filename, suggested_collection_name, UploadGuard};
use crate::domain::{CollectionsResponse, IndexRequest, IndexResponse, UploadResponse};
use crate::AppState;

/// Field carrying the PDF in multipart uploads
const FILE_FIELD: &str = "file";

fn internal(e: impl std::fmt::Display) -> ApiError {
    ApiError::Internal(e.to_string())
}

/// Stream one multipart field into `tmp`, validating as bytes arrive
async fn stream_to_temp(field: &mut Field, tmp: &Path, limit_bytes: u64) -> Result<u64, ApiError> {
    let mut file = fs::File::create(tmp).await.map_err(internal)?;
    let mut guard = UploadGuard::new(limit_bytes);

    while let Some(chunk) = field.try_next().await.map_err(|_| FileRejection::Malformed)? {
        guard.accept(&chunk)?;
        file.write_all(&chunk).await.map_err(internal)?;
    }
    file.flush().await.map_err(internal)?;

    Ok(guard.finish()?)
}

/// POST /upload-pdf - Upload a PDF for indexing
#[utoipa::path(
    post,
    path = "/upload-pdf",
    tag = "documents",
    request_body(content_type = "multipart/form-data", description = "PDF in the `file` field"),
    responses(
        (status = 200, description = "File stored", body = UploadResponse),
        (status = 400, description = "Not a PDF or bad filename", body = ErrorBody),
        (status = 413, description = "File too large", body = ErrorBody),
        (status = 429, description = "Rate limit exceeded", body = ErrorBody)
    ),
    security(("api_key" = []))
)]
pub async fn upload_pdf(
    state: web::Data<AppState>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let limit = state.settings.security.max_upload_bytes();
    let upload_dir: PathBuf = state.settings.storage.upload_dir.clone();
    fs::create_dir_all(&upload_dir).await.map_err(internal)?;

    while let Some(mut field) = payload.try_next().await.map_err(|_| FileRejection::Malformed)? {
        if field.name() != Some(FILE_FIELD) {
            while field.try_next().await.map_err(|_| FileRejection::Malformed)?.is_some() {}
            continue;
        }

        let raw_name = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string)
            .ok_or(FileRejection::BadFilename)?;
        let filename = sanitize_filename(&raw_name)?;

        let tmp = upload_dir.join(format!(".upload-{}.tmp", uuid::Uuid::new_v4().simple()));
        let size = match stream_to_temp(&mut field, &tmp, limit).await {
            Ok(size) => size,
            Err(err) => {
                let _ = fs::remove_file(&tmp).await;
                warn!(
                    target: "security",
                    event = "upload_rejected",
                    filename = %filename,
                    reason = %err,
                    "Upload rejected"
                );
                return Err(err);
            }
        };

        if let Err(e) = fs::rename(&tmp, upload_dir.join(&filename)).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(internal(e));
        }

        info!(filename = %filename, bytes = size, "PDF uploaded");

        return Ok(HttpResponse::Ok().json(UploadResponse {
            message: format!("File {} uploaded successfully", filename),
            suggested_collection_name: suggested_collection_name(&filename),
            filename,
        }));
    }

    Err(FileRejection::Missing.into())
}

/// POST /index-pdf/{filename} - Index an uploaded PDF into a collection
#[utoipa::path(
    post,
    path = "/index-pdf/{filename}",
    tag = "documents",
    params(("filename" = String, Path, description = "Name returned by the upload")),
    request_body = IndexRequest,
    responses(
        (status = 200, description = "PDF indexed", body = IndexResponse),
        (status = 400, description = "Invalid request", body = ErrorBody),
        (status = 404, description = "File not uploaded", body = ErrorBody),
        (status = 503, description = "Tutoring services unavailable", body = ErrorBody)
    ),
    security(("api_key" = []))
)]
pub async fn index_pdf(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<IndexRequest>,
) -> Result<HttpResponse, ApiError> {
    let filename = path.into_inner();
    match sanitize_filename(&filename) {
        Ok(clean) if clean == filename => {}
        _ => return Err(FileRejection::BadFilename.into()),
    }
    body.validate()?;

    let tutor = require_tutor(&state)?;
    let chunks = tutor.index_pdf(&filename, &body.collection_name).await?;

    info!(filename = %filename, collection = %body.collection_name, chunks, "Collection indexed");

    Ok(HttpResponse::Ok().json(IndexResponse {
        message: format!(
            "Indexed '{}' into collection '{}'",
            filename, body.collection_name
        ),
        collection_name: body.collection_name.clone(),
    }))
}

/// GET /collections - List indexed collections
#[utoipa::path(
    get,
    path = "/collections",
    tag = "documents",
    responses(
        (status = 200, description = "Collection names", body = CollectionsResponse),
        (status = 401, description = "Missing or invalid API key", body = ErrorBody)
    ),
    security(("api_key" = []))
)]
pub async fn list_collections(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let collections = state.collections.list_collections().await?;
    Ok(HttpResponse::Ok().json(CollectionsResponse { collections }))
}
