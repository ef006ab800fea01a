//! Uploaded file checks
//!
//! The extension is checked but never trusted: content must start with the
//! PDF signature and stay under the size limit.

use super::error::FileRejection;
use crate::domain::tutoring::MAX_COLLECTION_NAME_LEN;

/// Leading bytes of every PDF document
pub const PDF_MAGIC: &[u8] = b"%PDF-";

const MAX_FILENAME_LEN: usize = 255;

fn max_mb(limit_bytes: u64) -> u64 {
    limit_bytes / (1024 * 1024)
}

/// Reject a declared or observed size above `limit_bytes`
pub fn check_size(size: u64, limit_bytes: u64) -> Result<(), FileRejection> {
    if size > limit_bytes {
        return Err(FileRejection::TooLarge { max_mb: max_mb(limit_bytes) });
    }
    Ok(())
}

/// Check the PDF signature of the first bytes of a file
pub fn check_signature(head: &[u8]) -> Result<(), FileRejection> {
    if head.starts_with(PDF_MAGIC) {
        Ok(())
    } else {
        Err(FileRejection::BadSignature)
    }
}

/// Reduce a client-supplied name to a safe bare `.pdf` file name.
///
/// Directory components are dropped and anything outside
/// `[A-Za-z0-9._- ]` becomes `_`.
pub fn sanitize_filename(raw: &str) -> Result<String, FileRejection> {
    let base = raw
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() || cleaned.starts_with('.') || cleaned.len() > MAX_FILENAME_LEN {
        return Err(FileRejection::BadFilename);
    }
    if !cleaned.to_ascii_lowercase().ends_with(".pdf") || cleaned.len() == 4 {
        return Err(FileRejection::BadExtension);
    }

    Ok(cleaned)
}

/// Collection name proposed for an uploaded file: its stem, made valid
pub fn suggested_collection_name(filename: &str) -> String {
    let stem = filename
        .get(..filename.len().saturating_sub(4))
        .unwrap_or(filename)
        .trim_start_matches('.');
    let mut name: String = stem
        .chars()
        .take(MAX_COLLECTION_NAME_LEN)
        .collect();
    while name.contains("..") {
        name = name.replace("..", ".");
    }
    if name.is_empty() {
        name = "collection".to_string();
    }
    name
}

/// Incremental validator for a streamed upload
#[derive(Debug)]
pub struct UploadGuard {
    limit_bytes: u64,
    received: u64,
    head: Vec<u8>,
}

impl UploadGuard {
    pub fn new(limit_bytes: u64) -> Self {
        Self { limit_bytes, received: 0, head: Vec::with_capacity(PDF_MAGIC.len()) }
    }

    /// Account for the next chunk, failing as soon as the file is
    /// oversized or its first bytes are not a PDF signature
    pub fn accept(&mut self, chunk: &[u8]) -> Result<(), FileRejection> {
        self.received += chunk.len() as u64;
        check_size(self.received, self.limit_bytes)?;

        if self.head.len() < PDF_MAGIC.len() {
            let take = (PDF_MAGIC.len() - self.head.len()).min(chunk.len());
            self.head.extend_from_slice(&chunk[..take]);
            if !PDF_MAGIC.starts_with(&self.head) {
                return Err(FileRejection::BadSignature);
            }
        }
        Ok(())
    }

    /// Final check once the stream has ended
    pub fn finish(&self) -> Result<u64, FileRejection> {
        if self.received == 0 {
            return Err(FileRejection::Missing);
        }
        check_signature(&self.head)?;
        Ok(self.received)
    }
}
