use std::path::PathBuf;
use storyreel_core::error::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("missing {role} input: {path}")]
    MissingInput { role: &'static str, path: PathBuf },

    #[error("{role} has no {stream} stream: {path}")]
    MissingStream {
        role: &'static str,
        stream: &'static str,
        path: PathBuf,
    },

    #[error("failed to execute ffprobe: {0}")]
    FfprobeExec(String),

    #[error("ffprobe failed: {0}")]
    FfprobeFailed(String),

    #[error("could not read duration: {0}")]
    DurationProbeFailed(String),

    #[error("ffmpeg not found")]
    FfmpegNotFound,

    #[error("ffmpeg failed ({}): {message}", describe_exit(.exit_code))]
    BackendExecutionFailed {
        message: String,
        exit_code: Option<i32>,
    },

    #[error("composition cancelled")]
    Cancelled,

    #[error("filter graph is inconsistent: {0}")]
    InvalidGraph(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RenderError {
    /// Whether re-running the same request could plausibly succeed.
    ///
    /// Only backend failures qualify; everything else is a configuration or
    /// input problem that a retry will hit again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RenderError::BackendExecutionFailed { .. })
    }
}

pub type Result<T> = std::result::Result<T, RenderError>;

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("exit code {c}"),
        None => "killed".to_string(),
    }
}
