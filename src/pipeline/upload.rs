//! Upload staging: turn a local path or uploaded bytes into a PDF on disk.
//!
//! Uploaded bytes are written to a [`NamedTempFile`] owned by the returned
//! [`PdfSource`]. The file is removed when the source is dropped, whether the
//! extraction succeeded or failed. The `%PDF` magic bytes are checked before
//! anything is sent to the OCR service, so a mislabelled upload fails fast
//! with a client error instead of burning an OCR job.

use crate::error::ExamOcrError;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Fallback file name when the client sends none.
pub const DEFAULT_UPLOAD_NAME: &str = "upload.pdf";

/// A PDF ready to be submitted for OCR.
pub enum PdfSource {
    /// A file the caller already had on disk.
    Local { path: PathBuf, name: String },
    /// Uploaded bytes staged into a temp file that lives as long as this value.
    Staged { name: String, file: NamedTempFile },
}

impl PdfSource {
    /// Path to the PDF regardless of how it was obtained.
    pub fn path(&self) -> &Path {
        match self {
            PdfSource::Local { path, .. } => path,
            PdfSource::Staged { file, .. } => file.path(),
        }
    }

    /// File name forwarded to the OCR service.
    pub fn file_name(&self) -> &str {
        match self {
            PdfSource::Local { name, .. } | PdfSource::Staged { name, .. } => name,
        }
    }

    /// Validate and stage uploaded bytes.
    pub fn from_bytes(name: Option<&str>, bytes: &[u8]) -> Result<Self, ExamOcrError> {
        let name = sanitize_file_name(name);
        if bytes.is_empty() {
            return Err(ExamOcrError::NoFileProvided);
        }
        check_magic(&name, bytes)?;

        let mut file = tempfile::Builder::new()
            .prefix("exam-upload-")
            .suffix(".pdf")
            .tempfile()
            .map_err(|source| ExamOcrError::Staging {
                name: name.clone(),
                source,
            })?;
        file.write_all(bytes)
            .and_then(|_| file.flush())
            .map_err(|source| ExamOcrError::Staging {
                name: name.clone(),
                source,
            })?;

        debug!("Staged '{}' ({} bytes) at {}", name, bytes.len(), file.path().display());
        Ok(PdfSource::Staged { name, file })
    }

    /// Validate a local PDF path.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ExamOcrError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(ExamOcrError::FileNotFound { path });
        }

        let mut file = std::fs::File::open(&path).map_err(|source| ExamOcrError::Io {
            path: path.clone(),
            source,
        })?;
        let mut magic = [0u8; 4];
        let read = file.read(&mut magic).map_err(|source| ExamOcrError::Io {
            path: path.clone(),
            source,
        })?;

        let name = sanitize_file_name(path.file_name().and_then(|n| n.to_str()));
        check_magic(&name, &magic[..read])?;

        debug!("Resolved local PDF: {}", path.display());
        Ok(PdfSource::Local { path, name })
    }

    /// Read the whole PDF into memory for upload.
    pub async fn read_bytes(&self) -> Result<Vec<u8>, ExamOcrError> {
        tokio::fs::read(self.path())
            .await
            .map_err(|source| ExamOcrError::Io {
                path: self.path().to_path_buf(),
                source,
            })
    }
}

impl std::fmt::Debug for PdfSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfSource")
            .field("name", &self.file_name())
            .field("path", &self.path())
            .finish()
    }
}

/// Reject anything that does not start with `%PDF`.
fn check_magic(name: &str, bytes: &[u8]) -> Result<(), ExamOcrError> {
    if bytes.starts_with(b"%PDF") {
        Ok(())
    } else {
        Err(ExamOcrError::NotAPdf {
            name: name.to_string(),
            magic: bytes.iter().take(4).copied().collect(),
        })
    }
}

/// Keep only the final path component of a client-supplied name.
fn sanitize_file_name(name: Option<&str>) -> String {
    name.and_then(|n| n.rsplit(['/', '\\']).next())
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(DEFAULT_UPLOAD_NAME)
        .to_string()
}
