//! File-backed vector store
//!
//! A collection is `<root>/<name>/index.json` holding chunk texts and their
//! embeddings. Search is brute-force cosine similarity.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use super::TutorError;

const INDEX_FILE: &str = "index.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredChunk {
    pub text: String,
    pub embedding: Vec<f32>,
}

/// An indexed document, loaded in memory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub name: String,
    pub source: String,
    pub chunks: Vec<StoredChunk>,
}

impl Collection {
    /// Chunk indices ordered by similarity to `query`, best first
    fn ranked(&self, query: &[f32], n: usize) -> Vec<(usize, f32)> {
        let mut scored: Vec<(usize, f32)> = self
            .chunks
            .iter()
            .enumerate()
            .map(|(i, c)| (i, cosine_similarity(query, &c.embedding)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(n);
        scored
    }

    /// Texts of the `k` chunks most similar to `query`, best first
    pub fn search(&self, query: &[f32], k: usize) -> Vec<&str> {
        self.ranked(query, k)
            .into_iter()
            .map(|(i, _)| self.chunks[i].text.as_str())
            .collect()
    }

    /// Maximal marginal relevance: pick `k` of the `fetch_k` nearest chunks,
    /// trading similarity to `query` against similarity to chunks already
    /// picked. `lambda` of 1.0 is plain top-k, 0.0 is maximum diversity.
    pub fn search_mmr(&self, query: &[f32], k: usize, fetch_k: usize, lambda: f32) -> Vec<&str> {
        let mut candidates = self.ranked(query, fetch_k.max(k));
        let mut picked: Vec<usize> = Vec::with_capacity(k);

        while picked.len() < k {
            let best = candidates
                .iter()
                .enumerate()
                .map(|(pos, &(idx, relevance))| {
                    let redundancy = picked
                        .iter()
                        .map(|&p| cosine_similarity(&self.chunks[idx].embedding, &self.chunks[p].embedding))
                        .fold(0.0_f32, f32::max);
                    (pos, lambda * relevance - (1.0 - lambda) * redundancy)
                })
                .fold(None, |best: Option<(usize, f32)>, cur| match best {
                    Some(b) if b.1 >= cur.1 => Some(b),
                    _ => Some(cur),
                });

            let Some((pos, _)) = best else { break };
            picked.push(candidates.remove(pos).0);
        }

        picked.into_iter().map(|i| self.chunks[i].text.as_str()).collect()
    }
}

/// Calculate cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Collections rooted at one directory
#[derive(Debug, Clone)]
pub struct VectorStore {
    root: PathBuf,
}

impl VectorStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn index_path(&self, name: &str) -> PathBuf {
        self.root.join(name).join(INDEX_FILE)
    }

    pub async fn exists(&self, name: &str) -> bool {
        fs::try_exists(self.index_path(name)).await.unwrap_or(false)
    }

    /// Names of directories under the root holding an index, sorted
    pub async fn list_collections(&self) -> Result<Vec<String>, TutorError> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(String::from) else {
                continue;
            };
            if self.exists(&name).await {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Write a collection, replacing any previous one of the same name
    pub async fn save(&self, collection: &Collection) -> Result<(), TutorError> {
        let dir = self.root.join(&collection.name);
        fs::create_dir_all(&dir).await?;

        let payload = serde_json::to_vec(collection)?;
        let tmp = dir.join(format!(".{}.{}.tmp", INDEX_FILE, uuid::Uuid::new_v4().simple()));
        fs::write(&tmp, payload).await?;
        if let Err(e) = fs::rename(&tmp, dir.join(INDEX_FILE)).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        info!(
            collection = %collection.name,
            chunks = collection.chunks.len(),
            "Collection saved"
        );
        Ok(())
    }

    pub async fn load(&self, name: &str) -> Result<Collection, TutorError> {
        let path = self.index_path(name);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TutorError::CollectionNotFound(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let collection: Collection = serde_json::from_slice(&bytes)?;
        debug!(collection = %name, chunks = collection.chunks.len(), "Collection loaded");
        Ok(collection)
    }
}
