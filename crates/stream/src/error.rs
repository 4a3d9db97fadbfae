//! Error types for DPE stream operations.

use thiserror::Error;

pub use crate::hub::HubError;
pub use crate::pipeline::{AdmissionError, PipelineError};

/// Errors that can occur anywhere in the stream crate.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Record failed admission
    #[error("Admission error: {0}")]
    Admission(#[from] AdmissionError),

    /// Ingest pipeline errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Broadcast hub errors
    #[error("Hub error: {0}")]
    Hub(#[from] HubError),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for stream operations.
pub type StreamResult<T> = Result<T, StreamError>;
