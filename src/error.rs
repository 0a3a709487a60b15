//! Error types for the tensor engine and model persistence
//!
//! All failures are local and synchronous: a shape violation anywhere aborts
//! the current sample's forward/backward computation and is never retried.

use thiserror::Error;

/// Errors raised by operators, the network engines, and persistence.
#[derive(Error, Debug)]
pub enum ModelError {
    /// Operand dimensions violate an operator's contract.
    #[error("shape mismatch in {op}: {details}")]
    ShapeMismatch { op: &'static str, details: String },

    /// Malformed operator parameters (odd counts where evenness is required,
    /// zero pad width, empty softmax input).
    #[error("invalid argument to {op}: {details}")]
    InvalidArgument { op: &'static str, details: String },

    /// Numerically undefined result, e.g. a zero probability under
    /// cross-entropy with a nonzero label weight.
    #[error("domain error in {op}: {details}")]
    DomainError { op: &'static str, details: String },

    /// Parameter blob cannot be parsed into the expected tensor set.
    #[error("malformed parameter blob: {0}")]
    Deserialization(String),

    /// Invalid training configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// File I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Configuration file parse error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, ModelError>;
