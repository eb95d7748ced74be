//! Error types for pipeline construction and configuration.

use thiserror::Error;

/// Errors raised while building or configuring the render pipeline.
///
/// None of these are retried. A failed rebuild leaves the previously active
/// pipeline in place and the error is handed back to the caller.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Shader compile/link failure or invalid target dimensions.
    #[error("failed to construct {label}: {reason}")]
    Construction { label: String, reason: String },

    /// GPU memory or render target allocation failure.
    #[error("GPU resource allocation failed for {label}: {reason}")]
    Resource { label: String, reason: String },

    /// Unknown variant key or a selection that cannot be placed.
    /// Rejected before any GPU allocation.
    #[error("invalid selection: {0}")]
    InvalidSelection(String),

    /// Unknown, reserved or mistyped uniform slot.
    #[error("uniform error: {0}")]
    Uniform(String),
}

impl PipelineError {
    pub fn construction(label: impl Into<String>, reason: impl ToString) -> Self {
        PipelineError::Construction {
            label: label.into(),
            reason: reason.to_string(),
        }
    }

    pub fn resource(label: impl Into<String>, reason: impl ToString) -> Self {
        PipelineError::Resource {
            label: label.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_selection(msg: impl ToString) -> Self {
        PipelineError::InvalidSelection(msg.to_string())
    }

    pub fn uniform(msg: impl ToString) -> Self {
        PipelineError::Uniform(msg.to_string())
    }
}

/// Result alias for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
