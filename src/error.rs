//! Error types surfaced by ingestion and query operations.

use thiserror::Error;

/// Reasons a submission or filter is rejected before anything is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required fields: {0}")]
    MissingFields(String),

    #[error("unable to determine location")]
    UnresolvedLocation,

    #[error("invalid coordinates: latitude {latitude}, longitude {longitude}")]
    InvalidCoordinates { latitude: String, longitude: String },

    #[error("invalid field {0}")]
    InvalidField(String),

    #[error("malformed submission: {0}")]
    Malformed(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),
}

/// Two summaries (or a summary and a measurement) belong to different buckets.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("bucket keys differ: {left} vs {right}")]
pub struct KeyMismatch {
    pub left: String,
    pub right: String,
}

/// Failure of a single ingestion.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("storage write failed: {0}")]
    Storage(#[source] anyhow::Error),
}

impl IngestError {
    /// Returns `true` when the caller sent bad input (as opposed to a backend failure).
    pub fn is_validation(&self) -> bool {
        matches!(self, IngestError::Validation(_))
    }
}
