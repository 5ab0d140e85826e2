//! Error types for building and evaluating executable nodes

use thiserror::Error;

use crate::parser::ParseError;

/// Result type for evaluation operations
pub type EvaluationResult<T> = Result<T, EvaluationError>;

/// Errors that can occur while evaluating a compiled mapping
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    /// A value had the wrong type for an operation
    #[error("{operation}: expected {expected} value, got {actual}")]
    TypeMismatch {
        /// Operation or node that rejected the value
        operation: String,
        /// Expected type description
        expected: String,
        /// Actual type found
        actual: String,
    },

    /// The context has no message at the required index
    #[error("message index {index} out of bounds for batch of size {size}")]
    NoMessage {
        /// Requested index
        index: usize,
        /// Batch size
        size: usize,
    },

    /// Variable referenced before assignment
    #[error("variable '{name}' undefined")]
    VariableNotFound {
        /// Variable name
        name: String,
    },

    /// Named mapping not present in the context
    #[error("map '{name}' was not found")]
    MappingNotFound {
        /// Mapping name
        name: String,
    },

    /// Division or remainder by zero
    #[error("attempted to divide by zero")]
    DivideByZero,

    /// A named node failed
    #[error("{name}: {message}")]
    Function {
        /// Node name, e.g. "method uppercase"
        name: String,
        /// Failure description
        message: String,
    },

    /// A node with dynamic arguments failed to construct itself
    #[error("{name}: {source}")]
    Build {
        /// Node name
        name: String,
        /// Construction failure
        source: BuildError,
    },

    /// A mapping executed from within another mapping failed
    #[error("failed to execute nested mapping: {0}")]
    NestedMapping(#[source] Box<EvaluationError>),

    /// A mapping statement failed
    #[error("failed assignment (line {line}): {source}")]
    Assignment {
        /// 1-based line of the statement
        line: usize,
        /// Underlying failure
        source: Box<EvaluationError>,
    },

    /// Mappings entered from one another too deeply
    #[error("mapping recursion exceeded the limit of {limit} levels")]
    RecursionLimit {
        /// Maximum nesting depth
        limit: usize,
    },

    /// Error raised explicitly by a mapping
    #[error("{0}")]
    Thrown(String),
}

impl EvaluationError {
    /// Create a type mismatch error
    pub fn type_mismatch(
        operation: impl Into<String>,
        expected: impl Into<String>,
        actual: &crate::model::Value,
    ) -> Self {
        Self::TypeMismatch {
            operation: operation.into(),
            expected: expected.into(),
            actual: actual.type_name().to_string(),
        }
    }

    /// Create a named node failure
    pub fn function(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Function {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Failures while constructing a node from its bound arguments
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BuildError {
    /// Argument binding or extraction failed
    #[error(transparent)]
    Param(#[from] ParamError),

    /// A mapping supplied as an argument failed to compile
    #[error("failed to parse mapping: {0}")]
    Parse(Box<ParseError>),

    /// Any other invalid construction
    #[error("{0}")]
    Invalid(String),
}

impl From<ParseError> for BuildError {
    fn from(err: ParseError) -> Self {
        Self::Parse(Box::new(err))
    }
}

/// Errors raised when binding call-site arguments against a parameter schema
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParamError {
    /// Required parameter not supplied
    #[error("missing required parameter '{name}'")]
    Missing {
        /// Parameter name
        name: String,
    },

    /// Parameter value has the wrong type
    #[error("parameter '{name}': expected {expected} value, got {actual}")]
    WrongType {
        /// Parameter name
        name: String,
        /// Expected kind
        expected: String,
        /// Actual type found
        actual: String,
    },

    /// Parameter supplied more than once
    #[error("parameter '{name}' supplied more than once")]
    Duplicate {
        /// Parameter name
        name: String,
    },

    /// Named argument that the schema does not declare
    #[error("unknown parameter '{name}'")]
    Unknown {
        /// Parameter name
        name: String,
    },

    /// More positional arguments than parameters
    #[error("expected at most {expected} arguments, got {actual}")]
    TooMany {
        /// Number of declared parameters
        expected: usize,
        /// Number of arguments supplied
        actual: usize,
    },

    /// Value present but failed validation
    #[error("parameter '{name}': {message}")]
    Invalid {
        /// Parameter name
        name: String,
        /// Validation failure
        message: String,
    },
}

/// Errors raised when registering specifications
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A specification with the same name already exists
    #[error("{kind} '{name}' is already registered")]
    Duplicate {
        /// "function" or "method"
        kind: &'static str,
        /// Conflicting name
        name: String,
    },
}
