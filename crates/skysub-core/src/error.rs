use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SkyError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid container: {0}")]
    InvalidContainer(String),

    #[error("Chip index {index} out of range (total: {total})")]
    ChipIndexOutOfRange { index: usize, total: usize },

    #[error("Insufficient sky candidates: found {found}, need {required}")]
    InsufficientCandidates { found: usize, required: usize },

    #[error("Missing metadata for {id}: {field}")]
    MissingMetadata { id: String, field: &'static str },

    #[error("Dimension mismatch for {id}: {got_rows}x{got_cols}, expected {want_rows}x{want_cols}")]
    DimensionMismatch {
        id: String,
        got_rows: usize,
        got_cols: usize,
        want_rows: usize,
        want_cols: usize,
    },

    #[error("External background service failed: {0}")]
    ExternalService(String),

    #[error("Candidate pool is empty")]
    EmptyPool,

    #[error("Candidate list error in {path}: {reason}")]
    CandidateList { path: PathBuf, reason: String },
}

impl SkyError {
    /// Per-frame recoverable errors: the batch skips the frame and continues.
    /// Everything else is reported as a failure for that frame.
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            SkyError::InsufficientCandidates { .. } | SkyError::MissingMetadata { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SkyError>;
