//! Data model for mapping evaluation
//!
//! Values flowing through mappings and the message parts and batches that
//! a pipeline hands to them.

pub mod message;
pub mod value;

pub use message::{MessageBatch, Part};
pub use value::{Object, Value};
