//! Parse error types

use thiserror::Error;

use super::span::line_col;
use crate::query::BuildError;

/// Result type for parsing operations
pub type ParseResult<T> = Result<T, ParseError>;

/// Errors raised while compiling mapping text. Every variant carries the
/// byte offset in the source where the problem was detected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// A token that does not fit the grammar at this point
    #[error("expected {expected}, got '{token}'")]
    UnexpectedToken {
        /// The token found
        token: String,
        /// What the parser expected instead
        expected: String,
        /// Position of the token
        position: usize,
    },

    /// Input ended early
    #[error("expected {expected}, got end of input")]
    UnexpectedEof {
        /// What the parser expected
        expected: String,
        /// Position of the end of input
        position: usize,
    },

    /// A string literal without its closing quote
    #[error("required: end quote")]
    UnclosedString {
        /// Position of the opening quote
        position: usize,
    },

    /// An unsupported escape sequence in a string literal
    #[error("invalid escape sequence '{sequence}'")]
    InvalidEscape {
        /// The offending sequence
        sequence: String,
        /// Position of the string literal
        position: usize,
    },

    /// A numeric literal that cannot be represented
    #[error("invalid number literal '{literal}'")]
    InvalidNumber {
        /// The literal text
        literal: String,
        /// Position of the literal
        position: usize,
    },

    /// Call to a function not visible in the parsing context
    #[error("unrecognised function '{name}'")]
    UnknownFunction {
        /// Function name
        name: String,
        /// Position of the call
        position: usize,
    },

    /// Call to a method not visible in the parsing context
    #[error("unrecognised method '{name}'")]
    UnknownMethod {
        /// Method name
        name: String,
        /// Position of the call
        position: usize,
    },

    /// Arguments rejected by a function or method constructor
    #[error("{name}: {source}")]
    InvalidCall {
        /// Annotated call name, e.g. "method bloblang"
        name: String,
        /// Construction failure
        source: BuildError,
        /// Position of the call
        position: usize,
    },

    /// A named mapping declared twice
    #[error("map '{name}' was declared more than once")]
    DuplicateMap {
        /// Mapping name
        name: String,
        /// Position of the second declaration
        position: usize,
    },

    /// Expressions or map blocks nested beyond the parser's limit
    #[error("expression nested more than {limit} levels deep")]
    TooDeep {
        /// Maximum nesting depth
        limit: usize,
        /// Position where the limit was exceeded
        position: usize,
    },

    /// An assignment target that cannot be written to
    #[error("invalid assignment target: {message}")]
    InvalidTarget {
        /// Description of the problem
        message: String,
        /// Position of the target
        position: usize,
    },
}

impl ParseError {
    /// Byte offset of the error in the source
    pub fn position(&self) -> usize {
        match self {
            ParseError::UnexpectedToken { position, .. }
            | ParseError::UnexpectedEof { position, .. }
            | ParseError::UnclosedString { position }
            | ParseError::InvalidEscape { position, .. }
            | ParseError::InvalidNumber { position, .. }
            | ParseError::UnknownFunction { position, .. }
            | ParseError::UnknownMethod { position, .. }
            | ParseError::InvalidCall { position, .. }
            | ParseError::DuplicateMap { position, .. }
            | ParseError::TooDeep { position, .. }
            | ParseError::InvalidTarget { position, .. } => *position,
        }
    }

    /// The same error with its position moved forward by `offset`, for
    /// errors raised while parsing a slice of a larger source
    pub fn shifted(mut self, offset: usize) -> Self {
        match &mut self {
            ParseError::UnexpectedToken { position, .. }
            | ParseError::UnexpectedEof { position, .. }
            | ParseError::UnclosedString { position }
            | ParseError::InvalidEscape { position, .. }
            | ParseError::InvalidNumber { position, .. }
            | ParseError::UnknownFunction { position, .. }
            | ParseError::UnknownMethod { position, .. }
            | ParseError::InvalidCall { position, .. }
            | ParseError::DuplicateMap { position, .. }
            | ParseError::TooDeep { position, .. }
            | ParseError::InvalidTarget { position, .. } => *position += offset,
        }
        self
    }

    /// Render the error with a 1-based line and character position
    /// resolved against the source it was raised for
    pub fn describe(&self, source: &str) -> String {
        let (line, col) = line_col(source, self.position());
        format!("line {line} char {col}: {self}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_resolves_line_and_char() {
        let source = "root = this\nroot.foo = nope(";
        let err = ParseError::UnknownFunction {
            name: "nope".into(),
            position: 23,
        };
        assert_eq!(
            err.describe(source),
            "line 2 char 12: unrecognised function 'nope'"
        );
    }
}
