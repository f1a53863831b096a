use thiserror::Error;

use crate::export::ExportError;
use crate::state::PersistenceError;

/// Errors surfaced by editor operations
#[derive(Debug, Error)]
pub enum EditorError {
    /// The imported document has no `layers` sequence, or a layer record is unreadable
    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    /// An image layer could not be linked back to a catalog entry
    #[error("Asset not found for layer {layer}: {reference}")]
    AssetUnresolved { layer: String, reference: String },

    /// Nothing to export
    #[error("No content to export")]
    NoContent,

    /// The auto-crop produced an empty rectangle
    #[error("Invalid crop bounds: {0}")]
    InvalidCropBounds(String),

    /// The rendering collaborator failed to produce a surface
    #[error("Render failed: {0}")]
    RenderFailed(String),

    #[error("Persistence failure: {0}")]
    PersistenceFailure(#[from] PersistenceError),

    /// A file prompt was dismissed. Never reported to the user.
    #[error("Cancelled by user")]
    UserCancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl EditorError {
    /// True for outcomes that end an operation without being an error
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::UserCancelled)
    }
}

impl From<ExportError> for EditorError {
    fn from(error: ExportError) -> Self {
        match error {
            ExportError::NoContent => Self::NoContent,
            ExportError::InvalidCropBounds(reason) => Self::InvalidCropBounds(reason),
            ExportError::RenderFailed(reason) => Self::RenderFailed(reason),
            ExportError::Encode(err) => Self::Image(err),
        }
    }
}

/// Result type for editor operations
pub type EditorResult<T> = Result<T, EditorError>;
