//! AI provider integration
//!
//! ```text
//!   LlmProvider   EmbeddingProvider
//!        \             /
//!        OpenAiProvider ──▶ RateLimitedClient (governor quota)
//! ```

pub mod http_client;
pub mod openai;
pub mod traits;

pub use openai::OpenAiProvider;
pub use traits::{ChatMessage, EmbeddingProvider, LlmProvider, ProviderError};
