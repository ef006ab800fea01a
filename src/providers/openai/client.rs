//! OpenAI API Client Implementation

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use super::models::*;
use crate::config::LlmSettings;
use crate::providers::http_client::RateLimitedClient;
use crate::providers::traits::{
    ChatMessage, EmbeddingProvider, LlmProvider, ProviderError, ProviderResult,
};

/// Inputs per embeddings request
const EMBEDDING_BATCH_SIZE: usize = 256;

/// OpenAI chat and embedding client
#[derive(Clone)]
pub struct OpenAiProvider {
    client: RateLimitedClient,
    api_key: String,
    base_url: String,
    chat_model: String,
    embedding_model: String,
    temperature: f32,
}

impl OpenAiProvider {
    pub fn new(settings: &LlmSettings) -> ProviderResult<Self> {
        let api_key = settings.resolved_api_key().ok_or_else(|| {
            ProviderError::NotConfigured("OPENAI_API_KEY environment variable not set".to_string())
        })?;

        let client = RateLimitedClient::new(
            settings.requests_per_minute,
            Duration::from_secs(settings.timeout_secs),
        )?;

        Ok(OpenAiProvider {
            client,
            api_key,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            chat_model: settings.chat_model.clone(),
            embedding_model: settings.embedding_model.clone(),
            temperature: settings.temperature,
        })
    }

    /// Make an authenticated POST request
    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> ProviderResult<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(
            url = %url,
            rpm = self.client.rate_limit_per_minute(),
            remaining = ?self.client.remaining_requests(),
            "OpenAI API request"
        );

        let response = self.client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorEnvelope>(&text)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| text.chars().take(500).collect());
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&text).map_err(|e| {
            ProviderError::ParseError(format!(
                "JSON parse error: {} - Body: {}",
                e,
                text.chars().take(500).collect::<String>()
            ))
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn code(&self) -> &'static str {
        "openai"
    }

    async fn chat(&self, messages: &[ChatMessage]) -> ProviderResult<String> {
        let request = ChatCompletionRequest {
            model: &self.chat_model,
            messages,
            temperature: self.temperature,
        };

        let response: ChatCompletionResponse = self.post("/chat/completions", &request).await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::ParseError("Completion had no content".to_string()))
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    fn code(&self) -> &'static str {
        "openai"
    }

    async fn embed(&self, inputs: &[String]) -> ProviderResult<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(inputs.len());

        for batch in inputs.chunks(EMBEDDING_BATCH_SIZE) {
            let request = EmbeddingRequest {
                model: &self.embedding_model,
                input: batch,
            };
            let mut response: EmbeddingResponse = self.post("/embeddings", &request).await?;

            if response.data.len() != batch.len() {
                return Err(ProviderError::ParseError(format!(
                    "Expected {} embeddings, got {}",
                    batch.len(),
                    response.data.len()
                )));
            }
            response.data.sort_by_key(|d| d.index);
            vectors.extend(response.data.into_iter().map(|d| d.embedding));
        }

        Ok(vectors)
    }
}
