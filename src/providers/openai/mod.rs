//! OpenAI-compatible provider
//!
//! Chat completions and embeddings over the `/chat/completions` and
//! `/embeddings` endpoints. Any server speaking the same wire format can be
//! targeted through `llm.base_url`.

mod client;
mod models;

pub use client::OpenAiProvider;
