use thiserror::Error;

/// The central error type for all operations in the carousel_engine.
#[derive(Error, Debug)]
pub enum CarouselError {
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Storage location unavailable: {0}")]
    StorageLocation(String),

    #[error("Image load error: {0}")]
    ImageLoad(String),

    #[error("Rendering surface unavailable: {0}")]
    CanvasUnavailable(String),

    #[error("Font error: {0}")]
    Font(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Image processing error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CarouselError {
    /// True for failures of the persistent mockup store.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            CarouselError::Storage(_) | CarouselError::StorageLocation(_)
        )
    }
}

// Variant-level equality. Foreign error payloads cannot be compared, so
// only the kind is checked for those.
impl PartialEq for CarouselError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (CarouselError::ImageLoad(a), CarouselError::ImageLoad(b)) => a == b,
            (CarouselError::CanvasUnavailable(a), CarouselError::CanvasUnavailable(b)) => a == b,
            (CarouselError::StorageLocation(a), CarouselError::StorageLocation(b)) => a == b,
            (CarouselError::Font(a), CarouselError::Font(b)) => a == b,
            (CarouselError::Config(a), CarouselError::Config(b)) => a == b,
            (CarouselError::Storage(_), CarouselError::Storage(_)) => true,
            (CarouselError::ImageError(_), CarouselError::ImageError(_)) => true,
            (CarouselError::IoError(_), CarouselError::IoError(_)) => true,
            (CarouselError::Json(_), CarouselError::Json(_)) => true,
            _ => false,
        }
    }
}

/// A centralized result type for our library.
pub type Result<T> = std::result::Result<T, CarouselError>;
