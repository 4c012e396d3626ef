//! Error types for the Stepwise domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.
//!
//! Malformed model replies are *not* errors at this level: they surface as
//! [`StepResult::Error`](crate::tool::StepResult) values and are turned into
//! retry feedback by the agent loop.

use thiserror::Error;

/// The top-level error type for all Stepwise operations.
///
/// A session only fails when model access does; everything else is either
/// a parameter error at construction or feedback for the model.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Provider has no more replies: {0}")]
    Exhausted(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Invalid tool parameters: {0}")]
    InvalidParameters(String),
}
