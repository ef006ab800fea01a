//! Question generation and answer evaluation

use actix_web::{web, HttpResponse};
use tracing::info;

use super::require_tutor;
use crate::api::error::{ApiError, ErrorBody};
use crate::api::middleware::with_cost;
use crate::domain::endpoint::{answer_evaluation_cost, question_generation_cost};
use crate::domain::{EvaluationRequest, EvaluationResult, QuestionRequest, QuestionsResponse};
use crate::AppState;

/// POST /generate-questions - Study questions from a collection
///
/// Costs one usage point per requested question.
#[utoipa::path(
    post,
    path = "/generate-questions",
    tag = "tutoring",
    request_body = QuestionRequest,
    responses(
        (status = 200, description = "Generated questions", body = QuestionsResponse),
        (status = 404, description = "Unknown collection", body = ErrorBody),
        (status = 429, description = "Rate limit exceeded", body = ErrorBody),
        (status = 503, description = "Tutoring services unavailable", body = ErrorBody)
    ),
    security(("api_key" = []))
)]
pub async fn generate_questions(
    state: web::Data<AppState>,
    body: web::Json<QuestionRequest>,
) -> Result<HttpResponse, ApiError> {
    body.validate()?;
    let tutor = require_tutor(&state)?;

    let questions = tutor
        .generate_questions(&body.collection_name, body.num_questions)
        .await?;

    info!(
        collection = %body.collection_name,
        requested = body.num_questions,
        generated = questions.len(),
        "Questions generated"
    );

    let response = HttpResponse::Ok().json(QuestionsResponse {
        questions,
        collection_name: body.collection_name.clone(),
    });
    Ok(with_cost(response, question_generation_cost(body.num_questions)))
}

/// POST /evaluate-answers - Grade answers against the collection
///
/// Costs three usage points per answer.
#[utoipa::path(
    post,
    path = "/evaluate-answers",
    tag = "tutoring",
    request_body = EvaluationRequest,
    responses(
        (status = 200, description = "One result per answer", body = [EvaluationResult]),
        (status = 404, description = "Unknown collection", body = ErrorBody),
        (status = 429, description = "Rate limit exceeded", body = ErrorBody),
        (status = 503, description = "Tutoring services unavailable", body = ErrorBody)
    ),
    security(("api_key" = []))
)]
pub async fn evaluate_answers(
    state: web::Data<AppState>,
    body: web::Json<EvaluationRequest>,
) -> Result<HttpResponse, ApiError> {
    body.validate()?;
    let tutor = require_tutor(&state)?;

    let results = tutor
        .evaluate_answers(&body.collection_name, &body.answers)
        .await?;

    info!(
        collection = %body.collection_name,
        answers = results.len(),
        "Answers evaluated"
    );

    Ok(with_cost(
        HttpResponse::Ok().json(results),
        answer_evaluation_cost(body.answers.len()),
    ))
}
