//! Error handling for the job matcher

use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobMatcherError {
    #[error("Invalid input for record '{id}': {reason}")]
    InvalidInput { id: String, reason: String },

    #[error("Model loading error: {0}")]
    ModelLoading(String),

    #[error(
        "Incompatible vectors '{left_id}' ({left_model}, dim {left_dimension}) and \
         '{right_id}' ({right_model}, dim {right_dimension})"
    )]
    IncompatibleVector {
        left_id: String,
        right_id: String,
        left_model: String,
        right_model: String,
        left_dimension: usize,
        right_dimension: usize,
    },

    #[error("Cache corruption: {0}")]
    CacheCorruption(String),

    #[error("Embedding generation error: {0}")]
    Embedding(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("File format not supported: {0}")]
    UnsupportedFormat(String),

    #[error("Text extraction error: {0}")]
    TextExtraction(String),

    #[error("Processing error: {0}")]
    Processing(String),
}

pub type Result<T> = std::result::Result<T, JobMatcherError>;

impl JobMatcherError {
    pub fn invalid_input(id: impl Into<String>, reason: impl Into<String>) -> Self {
        JobMatcherError::InvalidInput {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// The record this error is about, when it concerns a single record.
    pub fn record_id(&self) -> Option<&str> {
        match self {
            JobMatcherError::InvalidInput { id, .. } => Some(id),
            JobMatcherError::IncompatibleVector { right_id, .. } => Some(right_id),
            _ => None,
        }
    }

    /// Short stable name of the error kind, used in failure reports.
    pub fn kind(&self) -> &'static str {
        match self {
            JobMatcherError::InvalidInput { .. } => "invalid_input",
            JobMatcherError::ModelLoading(_) => "model_load",
            JobMatcherError::IncompatibleVector { .. } => "incompatible_vector",
            JobMatcherError::CacheCorruption(_) => "cache_corruption",
            JobMatcherError::Embedding(_) => "embedding",
            JobMatcherError::Configuration(_) => "configuration",
            JobMatcherError::Io(_) => "io",
            JobMatcherError::Serialization(_) => "serialization",
            JobMatcherError::UnsupportedFormat(_) => "unsupported_format",
            JobMatcherError::TextExtraction(_) => "text_extraction",
            JobMatcherError::Processing(_) => "processing",
        }
    }
}

/// Convert anyhow errors (returned by the Model2Vec runtime) to our error type
impl From<anyhow::Error> for JobMatcherError {
    fn from(err: anyhow::Error) -> Self {
        JobMatcherError::Embedding(err.to_string())
    }
}
