//! Compiled mappings
//!
//! A mapping is a sequence of assignments. Each statement evaluates a query
//! against the input and writes the result into the output document, a
//! variable, or the metadata of the message being mapped.

pub mod assignment;
pub mod executor;

pub use assignment::{AssignState, AssignmentTarget, Statement};
pub use executor::Mapping;
