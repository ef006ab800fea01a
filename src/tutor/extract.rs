//! PDF text extraction

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Extractor could not be started: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Extractor exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
}

/// Turns a PDF on disk into plain text
#[async_trait]
pub trait PdfTextExtractor: Send + Sync {
    async fn extract(&self, path: &Path) -> Result<String, ExtractionError>;
}

/// Extraction through the poppler `pdftotext` binary
#[derive(Debug, Clone)]
pub struct PdftotextExtractor {
    program: String,
}

impl Default for PdftotextExtractor {
    fn default() -> Self {
        Self { program: "pdftotext".to_string() }
    }
}

#[async_trait]
impl PdfTextExtractor for PdftotextExtractor {
    async fn extract(&self, path: &Path) -> Result<String, ExtractionError> {
        debug!(path = %path.display(), "Extracting PDF text");

        let output = Command::new(&self.program)
            .arg("-enc")
            .arg("UTF-8")
            .arg(path)
            .arg("-")
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            return Err(ExtractionError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        // Form feeds separate pages
        Ok(String::from_utf8_lossy(&output.stdout).replace('\u{c}', "\n\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary_is_a_spawn_error() {
        let extractor = PdftotextExtractor {
            program: "pdftotext-does-not-exist-here".to_string(),
        };
        let err = extractor.extract(Path::new("/tmp/x.pdf")).await.unwrap_err();
        assert!(matches!(err, ExtractionError::Spawn(_)));
    }
}
