//! Core data model shared by the store, compressor, client and orchestrator

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Opaque reference to encoded image bytes on durable storage
///
/// Handles are never mutated in place. Compression and saving always produce
/// a new handle pointing at a new (or overwritten) file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageHandle {
    /// Location of the encoded image, unique within its directory
    pub path: PathBuf,
    /// Encoded size on disk
    pub size_bytes: u64,
    /// MIME type guessed from the file extension
    pub mime_hint: Option<String>,
}

impl ImageHandle {
    /// Create a handle, guessing the MIME type from the extension
    #[must_use]
    pub fn new<P: Into<PathBuf>>(path: P, size_bytes: u64) -> Self {
        let path = path.into();
        let mime_hint = mime_from_path(&path);
        Self {
            path,
            size_bytes,
            mime_hint,
        }
    }

    /// Final path component as a string (lossy)
    #[must_use]
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Whether acquisition produced an empty file
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size_bytes == 0
    }

    /// MIME type to send upstream, falling back to a generic binary type
    #[must_use]
    pub fn mime_or_default(&self) -> &str {
        self.mime_hint
            .as_deref()
            .unwrap_or("application/octet-stream")
    }
}

fn mime_from_path(path: &Path) -> Option<String> {
    image::ImageFormat::from_path(path)
        .ok()
        .map(|format| format.to_mime_type().to_string())
}

/// One entry of a failure report: `{title, detail, code}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub title: String,
    #[serde(default)]
    pub detail: String,
    #[serde(default)]
    pub code: Option<String>,
}

impl ErrorDetail {
    #[must_use]
    pub fn new<T: Into<String>, D: Into<String>>(title: T, detail: D, code: Option<String>) -> Self {
        Self {
            title: title.into(),
            detail: detail.into(),
            code,
        }
    }

    /// Entry used when a failure carried no provider details at all
    #[must_use]
    pub fn generic() -> Self {
        Self::new(
            "Network error",
            "The request failed before any response was received",
            None,
        )
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} : {} : {}", self.title, self.detail, code),
            None => write!(f, "{} : {}", self.title, self.detail),
        }
    }
}

/// Render a detail list as one `title : detail : code` line per entry
#[must_use]
pub fn format_error_details(details: &[ErrorDetail]) -> String {
    let mut out = String::new();
    for detail in details {
        out.push_str(&detail.to_string());
        out.push('\n');
    }
    out
}

/// Successfully produced background-removed image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputImage {
    /// Saved `<name>-no-bg.png` file
    pub handle: ImageHandle,
    /// Input this output was derived from (back-reference only)
    pub derived_from_input: ImageHandle,
}
