use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid transcript segment {index}: {reason}")]
    InvalidSegment { index: usize, reason: String },

    #[error("invalid caption style: {0}")]
    InvalidStyle(String),

    #[error("invalid image overlay {index}: {reason}")]
    InvalidOverlay { index: usize, reason: String },

    #[error("invalid subtitle file at line {line}: {reason}")]
    InvalidSubtitle { line: usize, reason: String },

    #[error("invalid job id: {0:?}")]
    InvalidJobId(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
