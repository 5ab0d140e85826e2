//! Specifications describing registered functions and methods
//!
//! A specification carries everything a registry needs to expose a builtin:
//! its name, documentation, parameter schema and capability flags. Entries
//! pair a specification with the constructor that turns bound arguments into
//! an executable node.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::error::BuildError;
use super::function::FunctionRef;
use super::params::{Param, Params, ParsedParams};

/// Grouping used when documenting builtins
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, Hash, PartialEq)]
pub enum Category {
    /// Value construction and control flow
    General,
    /// Access to the message being processed
    Message,
    /// Access to the host environment
    Environment,
    /// String manipulation
    Strings,
    /// Numeric helpers
    Numbers,
    /// Object and array manipulation
    ObjectArray,
    /// Encoding and decoding
    Encoding,
    /// Parsing and formatting
    Parsing,
    /// Type coercion
    Coercion,
    /// Time and dates
    Timestamps,
    /// Error recovery
    ErrorHandling,
}

/// Stability of a builtin
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, Hash, PartialEq)]
pub enum Status {
    /// Stable API
    #[default]
    Stable,
    /// May change in minor ways
    Beta,
    /// May change or be removed
    Experimental,
}

/// A documented usage example
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Example {
    /// Mapping text demonstrating the builtin
    pub mapping: String,
    /// Input and expected output document pairs
    pub results: Vec<(String, String)>,
}

impl Example {
    /// Create an example
    pub fn new(mapping: impl Into<String>, results: &[(&str, &str)]) -> Self {
        Self {
            mapping: mapping.into(),
            results: results
                .iter()
                .map(|(i, o)| (i.to_string(), o.to_string()))
                .collect(),
        }
    }
}

/// Capability flags shared by function and method specifications
pub trait Capabilities {
    /// Entry name
    fn name(&self) -> &str;

    /// Deterministic and free of host I/O
    fn is_pure(&self) -> bool;

    /// Reads the in-flight message or batch
    fn requires_message(&self) -> bool;
}

macro_rules! spec_builder {
    ($spec:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq)]
        pub struct $spec {
            /// Name used at call sites
            pub name: String,
            /// Documentation category
            pub category: Category,
            /// Human readable description
            pub description: String,
            /// Stability
            pub status: Status,
            /// Parameter schema
            pub params: Params,
            /// Usage examples
            pub examples: Vec<Example>,
            /// Deterministic and free of host I/O
            pub pure: bool,
            /// Reads the in-flight message or batch
            pub requires_message: bool,
        }

        impl $spec {
            /// Create a pure, stable specification with no parameters
            pub fn new(
                name: impl Into<String>,
                category: Category,
                description: impl Into<String>,
            ) -> Self {
                Self {
                    name: name.into(),
                    category,
                    description: description.into(),
                    status: Status::Stable,
                    params: Params::new(),
                    examples: Vec::new(),
                    pure: true,
                    requires_message: false,
                }
            }

            /// Append a parameter
            pub fn param(mut self, param: Param) -> Self {
                self.params = self.params.add(param);
                self
            }

            /// Append an example
            pub fn example(mut self, mapping: &str, results: &[(&str, &str)]) -> Self {
                self.examples.push(Example::new(mapping, results));
                self
            }

            /// Mark as impure
            pub fn impure(mut self) -> Self {
                self.pure = false;
                self
            }

            /// Mark as reading the message being processed
            pub fn requires_message(mut self) -> Self {
                self.requires_message = true;
                self
            }

            /// Mark as beta
            pub fn beta(mut self) -> Self {
                self.status = Status::Beta;
                self
            }

            /// Mark as experimental
            pub fn experimental(mut self) -> Self {
                self.status = Status::Experimental;
                self
            }
        }

        impl Capabilities for $spec {
            fn name(&self) -> &str {
                &self.name
            }

            fn is_pure(&self) -> bool {
                self.pure
            }

            fn requires_message(&self) -> bool {
                self.requires_message
            }
        }
    };
}

spec_builder!(FunctionSpec, "Specification of a function, called as `name(args)`");
spec_builder!(MethodSpec, "Specification of a method, called as `target.name(args)`");

/// Builds a function node from bound arguments
pub type FunctionCtor =
    Arc<dyn Fn(&ParsedParams) -> Result<FunctionRef, BuildError> + Send + Sync>;

/// Builds a method node from its target and bound arguments
pub type MethodCtor =
    Arc<dyn Fn(FunctionRef, &ParsedParams) -> Result<FunctionRef, BuildError> + Send + Sync>;

/// A registered function
#[derive(Clone)]
pub struct FunctionEntry {
    /// Specification
    pub spec: FunctionSpec,
    /// Constructor
    pub ctor: FunctionCtor,
}

impl FunctionEntry {
    /// Pair a specification with its constructor
    pub fn new<F>(spec: FunctionSpec, ctor: F) -> Self
    where
        F: Fn(&ParsedParams) -> Result<FunctionRef, BuildError> + Send + Sync + 'static,
    {
        Self {
            spec,
            ctor: Arc::new(ctor),
        }
    }
}

impl fmt::Debug for FunctionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionEntry")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

impl Capabilities for FunctionEntry {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn is_pure(&self) -> bool {
        self.spec.pure
    }

    fn requires_message(&self) -> bool {
        self.spec.requires_message
    }
}

/// A registered method
#[derive(Clone)]
pub struct MethodEntry {
    /// Specification
    pub spec: MethodSpec,
    /// Constructor
    pub ctor: MethodCtor,
}

impl MethodEntry {
    /// Pair a specification with its constructor
    pub fn new<F>(spec: MethodSpec, ctor: F) -> Self
    where
        F: Fn(FunctionRef, &ParsedParams) -> Result<FunctionRef, BuildError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            spec,
            ctor: Arc::new(ctor),
        }
    }
}

impl fmt::Debug for MethodEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodEntry")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

impl Capabilities for MethodEntry {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn is_pure(&self) -> bool {
        self.spec.pure
    }

    fn requires_message(&self) -> bool {
        self.spec.requires_message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_flags() {
        let spec = FunctionSpec::new("env", Category::Environment, "Reads a variable")
            .param(Param::string("name", "Variable name"))
            .impure()
            .beta();
        assert!(!spec.is_pure());
        assert!(!Capabilities::requires_message(&spec));
        assert_eq!(spec.status, Status::Beta);
        assert_eq!(spec.params.len(), 1);

        let spec = MethodSpec::new("uppercase", Category::Strings, "Uppercases")
            .example("root = this.uppercase()", &[(r#""a""#, r#""A""#)]);
        assert!(spec.is_pure());
        assert_eq!(spec.examples[0].results[0].1, r#""A""#);
    }
}
