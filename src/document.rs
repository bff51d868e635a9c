//! Passport document intake: candidate files, validation, accepted artifacts.
//!
//! The validator only looks at metadata the host already has (declared media
//! type and byte length). Content sniffing is the verification service's job.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::config::MAX_DOCUMENT_BYTES;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please upload an image file (JPG, PNG, etc.), got {media_type:?}")]
    InvalidType { media_type: String },

    #[error("File size must be less than {}MB", as_mb(.max))]
    TooLarge { size: u64, max: u64 },
}

fn as_mb(bytes: &u64) -> f64 {
    *bytes as f64 / 1_048_576.0
}

/// A file the user picked or dropped, not yet accepted.
#[derive(Debug, Clone)]
pub struct CandidateFile {
    pub filename: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl CandidateFile {
    pub fn new(filename: impl Into<String>, media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            media_type: media_type.into(),
            bytes,
        }
    }

    /// Load a candidate from disk. The media type is guessed from the
    /// extension, as a browser file picker would report it.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        let media_type = mime_guess::from_path(path)
            .first_raw()
            .unwrap_or("application/octet-stream")
            .to_string();
        Ok(Self {
            filename,
            media_type,
            bytes,
        })
    }

    pub fn byte_len(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// An accepted passport image. Cheap to clone; the bytes are shared.
#[derive(Debug, Clone)]
pub struct DocumentArtifact {
    filename: String,
    media_type: String,
    bytes: Arc<[u8]>,
    accepted_at: DateTime<Utc>,
}

impl DocumentArtifact {
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn byte_len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn accepted_at(&self) -> DateTime<Utc> {
        self.accepted_at
    }

    pub fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            filename: self.filename.clone(),
            media_type: self.media_type.clone(),
            byte_len: self.byte_len(),
            accepted_at: self.accepted_at,
        }
    }
}

/// What the view layer gets to see of the passport.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentSummary {
    pub filename: String,
    pub media_type: String,
    pub byte_len: u64,
    pub accepted_at: DateTime<Utc>,
}

/// Type/size gate for passport uploads.
#[derive(Debug, Clone)]
pub struct DocumentValidator {
    max_bytes: u64,
}

impl Default for DocumentValidator {
    fn default() -> Self {
        Self::new(MAX_DOCUMENT_BYTES)
    }
}

impl DocumentValidator {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Type is checked before size, so a huge PDF reports `InvalidType`.
    pub fn validate(&self, file: &CandidateFile) -> Result<(), ValidationError> {
        if !file.media_type.starts_with("image/") {
            return Err(ValidationError::InvalidType {
                media_type: file.media_type.clone(),
            });
        }
        if file.byte_len() > self.max_bytes {
            return Err(ValidationError::TooLarge {
                size: file.byte_len(),
                max: self.max_bytes,
            });
        }
        Ok(())
    }

    pub fn accept(&self, file: CandidateFile) -> Result<DocumentArtifact, ValidationError> {
        self.validate(&file)?;
        Ok(DocumentArtifact {
            filename: file.filename,
            media_type: file.media_type,
            bytes: file.bytes.into(),
            accepted_at: Utc::now(),
        })
    }
}
