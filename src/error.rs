use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScoringError {
    #[error("activity window has {points} point(s); at least 2 are needed for a trend")]
    InsufficientData { points: usize },

    #[error("invalid timestamp in {field}: {value}")]
    InvalidTimestamp { field: &'static str, value: String },

    #[error("malformed record at index {index}: {reason}")]
    MalformedRecord { index: usize, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ScoringResult<T> = Result<T, ScoringError>;
