//! Domain types and models

pub mod endpoint;
pub mod tutoring;

pub use endpoint::{Endpoint, RateLimitRule};
pub use tutoring::{
    Answer, CollectionsResponse, EvaluationRequest, EvaluationResult, IndexRequest,
    IndexResponse, QuestionRequest, QuestionsResponse, UploadResponse, ValidationError,
};
