//! Error types for EPUB flattening

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("Failed to read container {path}: {reason}")]
    Container { path: String, reason: String },

    #[error("Invalid package metadata: {0}")]
    Metadata(String),

    #[error("Spine references unknown manifest item '{0}'")]
    UnknownSpineItem(String),

    #[error("Spine item '{idref}' is {media_type}, not XHTML")]
    NonMarkupSpineItem { idref: String, media_type: String },

    #[error("Document listed in the package is missing from the container: {0}")]
    MissingDocument(String),

    #[error("Package spine lists no XHTML documents")]
    EmptySpine,

    #[error("Malformed document {path}: {reason}")]
    MalformedDocument { path: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MergeError {
    pub(crate) fn malformed(path: &str, reason: impl ToString) -> Self {
        MergeError::MalformedDocument {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }

    /// True for failures in the package metadata (manifest/spine) rather
    /// than in the archive or an individual document
    pub fn is_metadata_error(&self) -> bool {
        matches!(
            self,
            MergeError::Metadata(_)
                | MergeError::UnknownSpineItem(_)
                | MergeError::NonMarkupSpineItem { .. }
        )
    }
}
