//! Bloblang mapping language in Rust
//!
//! An embeddable mapping language for message pipelines. Mappings are
//! compiled into immutable node trees against a registry of functions and
//! methods, and may run further mappings supplied at runtime under a
//! restricted set of capabilities.
//!
//! ```
//! use bloblang::{Value, environment};
//! use serde_json::json;
//!
//! let mapping = bloblang::parse_mapping(
//!     &environment::parsing_context(),
//!     "example",
//!     "root.body = this.body.bloblang(this.mapping)",
//! )
//! .unwrap();
//!
//! let input = Value::from(json!({
//!     "body": {"foo": "hello world"},
//!     "mapping": "root.foo = this.foo.uppercase()",
//! }));
//! assert_eq!(
//!     mapping.exec_value(input).unwrap(),
//!     Value::from(json!({"body": {"foo": "HELLO WORLD"}})),
//! );
//! ```

pub mod config;
pub mod environment;
pub mod error;
pub mod interpolation;
pub mod mapping;
pub mod model;
pub mod parser;
pub mod plugins;
pub mod processor;
pub mod query;

// Re-export main types
pub use config::{CapabilityConfig, ProcessorConfig};
pub use environment::Environment;
pub use error::{Error, Result};
pub use interpolation::InterpolatedString;
pub use mapping::Mapping;
pub use model::{MessageBatch, Part, Value};
pub use parser::{ParseError, ParsingContext, parse_mapping, parse_query};
pub use processor::MappingProcessor;
pub use query::{EvaluationContext, EvaluationError, Function, FunctionRef};
