use std::path::Path;

use crate::errors::AppResult;

/// MIME type used for every re-encoded image
pub const RESIZED_MIME_TYPE: &str = "image/png";

/// A file accepted into the upload queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFile {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub display_name: String,
}

impl PendingFile {
    pub fn new(bytes: Vec<u8>, mime_type: &str, display_name: &str) -> Self {
        Self {
            bytes,
            mime_type: mime_type.to_string(),
            display_name: display_name.to_string(),
        }
    }

    /// Read a file from disk, guessing its MIME type from the extension
    pub async fn from_path(path: &Path) -> AppResult<Self> {
        let bytes = tokio::fs::read(path).await?;
        let display_name = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        Ok(Self {
            bytes,
            mime_type: mime_for_path(path).to_string(),
            display_name,
        })
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    /// Same display name, new content
    pub fn with_content(&self, bytes: Vec<u8>, mime_type: &str) -> Self {
        Self {
            bytes,
            mime_type: mime_type.to_string(),
            display_name: self.display_name.clone(),
        }
    }
}

pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        _ => "application/octet-stream",
    }
}

/// Where files go and how big they may be
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub endpoint_url: String,
    pub thread_id: Option<String>,
    pub max_bytes: u64,
}

impl UploadTarget {
    pub fn has_endpoint(&self) -> bool {
        !self.endpoint_url.trim().is_empty()
    }
}
