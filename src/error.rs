//! Crate-level error type

use thiserror::Error;

use crate::parser::ParseError;
use crate::query::{EvaluationError, RegistryError};

/// Result type for crate-level operations
pub type Result<T> = std::result::Result<T, Error>;

/// Any failure surfaced by the public API
#[derive(Error, Debug)]
pub enum Error {
    /// Mapping text failed to compile
    #[error("failed to parse mapping: {0}")]
    Parse(#[from] ParseError),

    /// A compiled mapping failed while executing
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    /// A builtin could not be registered
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}
