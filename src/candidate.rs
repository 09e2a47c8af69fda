use crate::preview::{PreviewHandle, PreviewStore};
use bytes::Bytes;
use mime::Mime;
use std::sync::Arc;
use thiserror::Error;

/// Largest image accepted for detection, 10 MB.
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("`{0}` is not an image")]
    NotAnImage(String),
    #[error("file is {0} bytes, larger than the 10 MB limit")]
    TooLarge(u64),
}

/// A file as the browser handed it over, before any validation.
#[derive(Debug, Clone)]
pub struct FileSelection {
    pub file_name: String,
    pub mime_type: String,
    /// Total bytes sent, which can exceed `bytes.len()` when the body was not buffered.
    pub size_bytes: u64,
    pub bytes: Bytes,
}

impl FileSelection {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, bytes: Bytes) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            size_bytes: bytes.len() as u64,
            bytes,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.size_bytes > MAX_UPLOAD_BYTES {
            return Err(ValidationError::TooLarge(self.size_bytes));
        }
        // The type has to survive multipart encoding at submit time too.
        if !self.mime_type.starts_with("image/") || self.mime_type.parse::<Mime>().is_err() {
            return Err(ValidationError::NotAnImage(self.mime_type.clone()));
        }
        if self.bytes.is_empty() {
            return Err(ValidationError::NotAnImage(format!(
                "{} (empty file)",
                self.mime_type
            )));
        }
        Ok(())
    }
}

/// A validated image waiting to be submitted.
#[derive(Debug, Clone)]
pub struct UploadCandidate {
    file_name: String,
    mime_type: String,
    bytes: Bytes,
    preview: Arc<PreviewHandle>,
}

impl UploadCandidate {
    pub fn new(selection: FileSelection, previews: &PreviewStore) -> Result<Self, ValidationError> {
        selection.validate()?;

        let preview = previews.register(&selection.mime_type, selection.bytes.clone());
        Ok(Self {
            file_name: selection.file_name,
            mime_type: selection.mime_type,
            bytes: selection.bytes,
            preview: Arc::new(preview),
        })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn preview(&self) -> &PreviewHandle {
        &self.preview
    }
}
