//! HTTP request handlers

pub mod admin;
pub mod documents;
pub mod health;
pub mod tutoring;

use std::sync::Arc;

use crate::api::error::ApiError;
use crate::tutor::TutorService;
use crate::AppState;

/// Tutoring services, or 503 when no LLM provider is configured
pub(crate) fn require_tutor(state: &AppState) -> Result<&Arc<TutorService>, ApiError> {
    state
        .tutor
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("Tutoring services not initialized".to_string()))
}
