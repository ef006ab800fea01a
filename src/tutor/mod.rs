//! Tutoring services: indexing PDFs, generating questions, grading answers
//!
//! ```text
//! upload_dir/book.pdf ─▶ PdfTextExtractor ─▶ RecursiveChunker ─▶ EmbeddingProvider
//!                                                                     │
//!                       vectorstore_dir/<collection>/index.json ◀─────┘
//!                                      │
//!             retrieve top-k ─▶ LlmProvider ─▶ questions / grades
//! ```

pub mod chunker;
pub mod extract;
pub mod grading;
pub mod vector_store;

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument};

use crate::domain::tutoring::{Answer, EvaluationResult, MAX_QUESTIONS, MIN_QUESTIONS};
use crate::providers::{EmbeddingProvider, LlmProvider, ProviderError};

pub use chunker::RecursiveChunker;
pub use extract::{ExtractionError, PdfTextExtractor, PdftotextExtractor};
pub use vector_store::{Collection, StoredChunk, VectorStore};

/// Tutor service errors
#[derive(Debug, Error)]
pub enum TutorError {
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("PDF contains no extractable text")]
    EmptyDocument,

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Indexing, question generation and grading over one vector store
pub struct TutorService {
    llm: Arc<dyn LlmProvider>,
    embedder: Arc<dyn EmbeddingProvider>,
    extractor: Arc<dyn PdfTextExtractor>,
    store: VectorStore,
    upload_dir: PathBuf,
    chunker: RecursiveChunker,
}

impl TutorService {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        embedder: Arc<dyn EmbeddingProvider>,
        extractor: Arc<dyn PdfTextExtractor>,
        store: VectorStore,
        upload_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            llm,
            embedder,
            extractor,
            store,
            upload_dir: upload_dir.into(),
            chunker: RecursiveChunker::default(),
        }
    }

    /// Extract, chunk and embed an uploaded PDF into `collection_name`.
    /// Returns the number of chunks stored.
    ///
    /// `filename` must already be a sanitized bare file name.
    #[instrument(skip(self))]
    pub async fn index_pdf(&self, filename: &str, collection_name: &str) -> Result<usize, TutorError> {
        let path = self.upload_dir.join(filename);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(TutorError::FileNotFound(filename.to_string()));
        }

        let text = self.extractor.extract(&path).await?;
        let texts = self.chunker.chunk(&text);
        if texts.is_empty() {
            return Err(TutorError::EmptyDocument);
        }

        let embeddings = self.embedder.embed(&texts).await?;
        if embeddings.len() != texts.len() {
            return Err(ProviderError::ParseError(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                embeddings.len()
            ))
            .into());
        }

        let chunks: Vec<StoredChunk> = texts
            .into_iter()
            .zip(embeddings)
            .map(|(text, embedding)| StoredChunk { text, embedding })
            .collect();
        let count = chunks.len();

        self.store
            .save(&Collection {
                name: collection_name.to_string(),
                source: filename.to_string(),
                chunks,
            })
            .await?;

        info!(filename, collection = collection_name, chunks = count, "PDF indexed");
        Ok(count)
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, TutorError> {
        self.embedder
            .embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ParseError("Empty embedding response".to_string()).into())
    }

    /// Study questions for a collection; `n` is clamped to 1..=10
    #[instrument(skip(self))]
    pub async fn generate_questions(&self, collection_name: &str, n: usize) -> Result<Vec<String>, TutorError> {
        let n = n.clamp(MIN_QUESTIONS, MAX_QUESTIONS);
        let collection = self.store.load(collection_name).await?;

        let query = self.embed_one(grading::OVERVIEW_QUERY).await?;
        let context = collection
            .search_mmr(
                &query,
                grading::QUESTION_CONTEXT_CHUNKS,
                grading::QUESTION_CANDIDATE_CHUNKS,
                grading::QUESTION_DIVERSITY_LAMBDA,
            )
            .join("\n\n");

        let raw = self.llm.chat(&grading::question_prompt(n, &context)).await?;
        Ok(grading::parse_questions(&raw, n))
    }

    /// Grade each answer against an ideal answer drawn from the collection
    #[instrument(skip(self, answers), fields(answers = answers.len()))]
    pub async fn evaluate_answers(
        &self,
        collection_name: &str,
        answers: &[Answer],
    ) -> Result<Vec<EvaluationResult>, TutorError> {
        let collection = self.store.load(collection_name).await?;
        let mut results = Vec::with_capacity(answers.len());

        for item in answers {
            let query = self.embed_one(&item.question).await?;
            let context = collection
                .search(&query, grading::GRADING_CONTEXT_CHUNKS)
                .join("\n\n");

            let ideal = self
                .llm
                .chat(&grading::ideal_answer_prompt(&item.question, &context))
                .await?;
            let raw = self
                .llm
                .chat(&grading::grading_prompt(&item.question, &item.answer, &context))
                .await?;
            let grade = grading::parse_grade(&raw);

            results.push(EvaluationResult {
                question: item.question.clone(),
                answer: item.answer.clone(),
                ideal_answer: ideal.trim().to_string(),
                score: grade.score,
                reasoning: grade.reasoning,
            });
        }

        Ok(results)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Deterministic collaborators for tests

    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::path::Path;

    use crate::providers::traits::ProviderResult;
    use crate::providers::ChatMessage;

    /// Replies with queued answers, then with a fixed fallback
    #[derive(Default)]
    pub struct ScriptedLlm {
        replies: Mutex<VecDeque<String>>,
        pub prompts: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedLlm {
        pub fn with_replies<I: IntoIterator<Item = &'static str>>(replies: I) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().map(String::from).collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        fn code(&self) -> &'static str {
            "scripted"
        }

        async fn chat(&self, messages: &[ChatMessage]) -> ProviderResult<String> {
            self.prompts.lock().push(messages.to_vec());
            Ok(self
                .replies
                .lock()
                .pop_front()
                .unwrap_or_else(|| "1. Fallback question?".to_string()))
        }
    }

    /// Embeds text as (length, vowel count, 1)
    pub struct CountingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for CountingEmbedder {
        fn code(&self) -> &'static str {
            "counting"
        }

        async fn embed(&self, inputs: &[String]) -> ProviderResult<Vec<Vec<f32>>> {
            Ok(inputs
                .iter()
                .map(|t| {
                    let vowels = t.chars().filter(|c| "aeiou".contains(*c)).count();
                    vec![t.len() as f32, vowels as f32, 1.0]
                })
                .collect())
        }
    }

    /// Returns the file's bytes as text
    pub struct PlainTextExtractor;

    #[async_trait]
    impl PdfTextExtractor for PlainTextExtractor {
        async fn extract(&self, path: &Path) -> Result<String, ExtractionError> {
            Ok(String::from_utf8_lossy(&tokio::fs::read(path).await?).into_owned())
        }
    }

    pub fn temp_dir(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!("pdftutor-{}-{}", label, uuid::Uuid::new_v4().simple()))
    }

    pub fn service_with(llm: Arc<ScriptedLlm>, root: &Path) -> TutorService {
        TutorService::new(
            llm,
            Arc::new(CountingEmbedder),
            Arc::new(PlainTextExtractor),
            VectorStore::new(root.join("vectorstores")),
            root.join("uploads"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    async fn indexed_service(llm: Arc<ScriptedLlm>) -> (TutorService, PathBuf) {
        let root = temp_dir("tutor");
        tokio::fs::create_dir_all(root.join("uploads")).await.unwrap();
        tokio::fs::write(
            root.join("uploads/bio.pdf"),
            "Cells are the basic unit of life.\n\nMitochondria produce energy.",
        )
        .await
        .unwrap();

        let service = service_with(llm, &root);
        service.index_pdf("bio.pdf", "biology").await.unwrap();
        (service, root)
    }

    #[tokio::test]
    async fn test_index_then_list() {
        let (service, root) = indexed_service(Arc::new(ScriptedLlm::default())).await;
        assert_eq!(service.store.list_collections().await.unwrap(), vec!["biology"]);
        let _ = tokio::fs::remove_dir_all(root).await;
    }

    #[tokio::test]
    async fn test_index_missing_file() {
        let root = temp_dir("tutor");
        let service = service_with(Arc::new(ScriptedLlm::default()), &root);
        let err = service.index_pdf("ghost.pdf", "x").await.unwrap_err();
        assert!(matches!(err, TutorError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn test_generate_questions_truncates_to_n() {
        let llm = Arc::new(ScriptedLlm::with_replies([
            "1. What is a cell?\n\n2. What do mitochondria do?\n3. Why is energy needed?",
        ]));
        let (service, root) = indexed_service(llm.clone()).await;

        let questions = service.generate_questions("biology", 2).await.unwrap();
        assert_eq!(questions, vec!["1. What is a cell?", "2. What do mitochondria do?"]);

        let prompts = llm.prompts.lock();
        assert!(prompts[0][0].content.contains("Generate 2 diverse"));
        assert!(prompts[0][0].content.contains("Mitochondria produce energy."));
        drop(prompts);
        let _ = tokio::fs::remove_dir_all(root).await;
    }

    #[tokio::test]
    async fn test_generate_questions_unknown_collection() {
        let root = temp_dir("tutor");
        let service = service_with(Arc::new(ScriptedLlm::default()), &root);
        let err = service.generate_questions("missing", 3).await.unwrap_err();
        assert!(matches!(err, TutorError::CollectionNotFound(_)));
    }

    #[tokio::test]
    async fn test_evaluate_answers_grades_each() {
        let llm = Arc::new(ScriptedLlm::with_replies([
            "  Cells are the smallest living units.  ",
            "```json\n{\"score\": 8, \"reasoning\": \"Accurate.\"}\n```",
            "Energy comes from mitochondria.",
            "no idea how to grade this",
        ]));
        let (service, root) = indexed_service(llm).await;

        let answers = vec![
            Answer { question: "What is a cell?".into(), answer: "Basic unit of life".into() },
            Answer { question: "Energy source?".into(), answer: String::new() },
        ];
        let results = service.evaluate_answers("biology", &answers).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].ideal_answer, "Cells are the smallest living units.");
        assert_eq!(results[0].score, Some(8));
        assert_eq!(results[0].reasoning, "Accurate.");
        assert_eq!(results[1].score, None);
        assert_eq!(results[1].reasoning, "no idea how to grade this");
        let _ = tokio::fs::remove_dir_all(root).await;
    }
}
