//! Attachment materialization.
//!
//! Callers describe attachments as [`AttachmentSource`]s: a name, an optional
//! MIME type and a byte source (base64 content or a file path). Before a
//! message is sent each source is read fully into memory and turned into an
//! [`Attachment`]. There is no streaming, which limits attachments to modest
//! sizes.

use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::DispatchError;

/// Filename used when the caller supplied none.
pub const DEFAULT_FILENAME: &str = "attachment";

/// A caller-supplied, not yet read attachment.
///
/// # Examples
///
/// ```
/// use mailshot::AttachmentSource;
///
/// // Inline bytes (base64 on the wire)
/// let report = AttachmentSource::from_bytes("report.pdf", b"%PDF-1.7".to_vec())
///     .content_type("application/pdf");
///
/// // File read at dispatch time
/// let invoice = AttachmentSource::from_path("/srv/invoices/42.pdf");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentSource {
    /// Filename shown to the recipient. Defaults to `"attachment"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// MIME type. Guessed from the filename when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Base64-encoded content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Path of a file to read at dispatch time.
    ///
    /// Library callers only. Never read from or written to JSON, so HTTP
    /// clients cannot make the server read its own files.
    #[serde(skip)]
    pub path: Option<PathBuf>,
}

impl AttachmentSource {
    /// Create a source from raw bytes.
    pub fn from_bytes(filename: impl Into<String>, data: impl AsRef<[u8]>) -> Self {
        Self {
            filename: Some(filename.into()),
            content: Some(base64::engine::general_purpose::STANDARD.encode(data)),
            ..Self::default()
        }
    }

    /// Create a source that reads a file when the job is dispatched.
    ///
    /// The filename defaults to the last path component.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string);
        Self {
            filename,
            path: Some(path),
            ..Self::default()
        }
    }

    /// Set the filename.
    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Set the content type explicitly.
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Read the source into a transport-ready [`Attachment`].
    ///
    /// # Errors
    ///
    /// `AttachmentRead` when the content is not valid base64, the file cannot
    /// be read, or the source has neither content nor path.
    pub async fn materialize(&self) -> Result<Attachment, DispatchError> {
        let filename = match self.filename.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => DEFAULT_FILENAME.to_string(),
        };

        let data = match (&self.content, &self.path) {
            (Some(content), _) => base64::engine::general_purpose::STANDARD
                .decode(content.trim())
                .map_err(|e| {
                    DispatchError::AttachmentRead(format!("{}: invalid base64: {}", filename, e))
                })?,
            (None, Some(path)) => tokio::fs::read(path).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    DispatchError::AttachmentRead(format!("{}: file not found", path.display()))
                } else {
                    DispatchError::AttachmentRead(format!("{}: {}", path.display(), e))
                }
            })?,
            (None, None) => {
                return Err(DispatchError::AttachmentRead(format!(
                    "{}: no content or path provided",
                    filename
                )))
            }
        };

        let content_type = match self.content_type.as_deref() {
            Some(ct) if !ct.is_empty() => ct.to_string(),
            _ => mime_guess::from_path(&filename)
                .first_or_octet_stream()
                .to_string(),
        };

        Ok(Attachment {
            filename,
            content_type,
            data,
        })
    }
}

/// A fully read attachment, owned by its message until the send completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Filename for the attachment.
    pub filename: String,
    /// MIME content type (e.g., "application/pdf").
    pub content_type: String,
    /// Raw attachment bytes.
    pub data: Vec<u8>,
}

impl Attachment {
    /// Size in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Materialize every source, preserving order.
///
/// An empty slice yields an empty list. The first failing source fails the
/// whole call; the error belongs to the job that owns the sources.
pub async fn materialize(sources: &[AttachmentSource]) -> Result<Vec<Attachment>, DispatchError> {
    let mut attachments = Vec::with_capacity(sources.len());
    for source in sources {
        attachments.push(source.materialize().await?);
    }
    Ok(attachments)
}
