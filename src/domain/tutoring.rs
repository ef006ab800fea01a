//! Request and response models for the learning endpoints

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

pub const MAX_COLLECTION_NAME_LEN: usize = 100;
pub const MIN_QUESTIONS: usize = 1;
pub const MAX_QUESTIONS: usize = 10;
pub const DEFAULT_QUESTIONS: usize = 3;
pub const MIN_SCORE: i64 = 1;
pub const MAX_SCORE: i64 = 10;

/// Request validation errors
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("collection_name must be between 1 and 100 characters")]
    CollectionNameLength,
    #[error("collection_name may only contain letters, digits, spaces, '-', '_' and '.'")]
    CollectionNameCharacters,
    #[error("num_questions must be between 1 and 10, got {0}")]
    QuestionCount(usize),
    #[error("at least one answer is required")]
    NoAnswers,
    #[error("answer {0} has an empty question")]
    EmptyQuestion(usize),
}

/// Collection names become directory names, so keep them to a safe alphabet
pub fn validate_collection_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() || name.chars().count() > MAX_COLLECTION_NAME_LEN {
        return Err(ValidationError::CollectionNameLength);
    }
    let safe = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ' '));
    if !safe || name.starts_with('.') || name.contains("..") {
        return Err(ValidationError::CollectionNameCharacters);
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    pub message: String,
    pub filename: String,
    pub suggested_collection_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IndexRequest {
    /// Name for the vector store collection
    pub collection_name: String,
}

impl IndexRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_collection_name(&self.collection_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IndexResponse {
    pub message: String,
    pub collection_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CollectionsResponse {
    pub collections: Vec<String>,
}

fn default_num_questions() -> usize {
    DEFAULT_QUESTIONS
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QuestionRequest {
    /// Collection to generate questions from
    pub collection_name: String,
    /// Number of questions to generate (1-10)
    #[serde(default = "default_num_questions")]
    pub num_questions: usize,
}

impl QuestionRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_collection_name(&self.collection_name)?;
        if !(MIN_QUESTIONS..=MAX_QUESTIONS).contains(&self.num_questions) {
            return Err(ValidationError::QuestionCount(self.num_questions));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QuestionsResponse {
    pub questions: Vec<String>,
    pub collection_name: String,
}

/// A student's answer to one question
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Answer {
    pub question: String,
    #[serde(default)]
    pub answer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EvaluationRequest {
    /// Collection to evaluate against
    pub collection_name: String,
    pub answers: Vec<Answer>,
}

impl EvaluationRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_collection_name(&self.collection_name)?;
        if self.answers.is_empty() {
            return Err(ValidationError::NoAnswers);
        }
        if let Some(idx) = self.answers.iter().position(|a| a.question.trim().is_empty()) {
            return Err(ValidationError::EmptyQuestion(idx));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EvaluationResult {
    pub question: String,
    pub answer: String,
    pub ideal_answer: String,
    /// Score from 1-10, or null if the grade could not be parsed
    pub score: Option<u8>,
    pub reasoning: String,
}

/// Clamp a raw model score into the 1-10 grading scale
pub fn clamp_score(raw: f64) -> Option<u8> {
    if !raw.is_finite() {
        return None;
    }
    Some((raw.round() as i64).clamp(MIN_SCORE, MAX_SCORE) as u8)
}
