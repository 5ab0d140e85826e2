//! Evaluation context handed to every executable node

use rustc_hash::FxHashMap;
use std::sync::Arc;

use super::error::{EvaluationError, EvaluationResult};
use super::function::FunctionRef;
use crate::model::{MessageBatch, Part, Value};

/// Variables in scope, shared between derived contexts
pub type Variables = FxHashMap<String, Value>;

/// Named mappings available to `apply`, shared between derived contexts
pub type NamedMappings = FxHashMap<String, FunctionRef>;

/// How many mappings may be entered from one another, through `apply` or
/// nested `bloblang` calls, before evaluation fails
pub const MAX_MAPPING_DEPTH: usize = 64;

/// Immutable snapshot of everything a node may read while evaluating.
///
/// Derivation methods return a new context and leave `self` untouched; all
/// fields are reference counted so derivation never deep-copies.
#[derive(Debug, Clone)]
pub struct EvaluationContext {
    value: Arc<Value>,
    variables: Arc<Variables>,
    maps: Arc<NamedMappings>,
    batch: Arc<MessageBatch>,
    index: usize,
    depth: usize,
}

impl EvaluationContext {
    /// Create a context over a value with no variables, maps or messages
    pub fn new(value: Value) -> Self {
        Self {
            value: Arc::new(value),
            variables: Arc::new(Variables::default()),
            maps: Arc::new(NamedMappings::default()),
            batch: Arc::new(MessageBatch::empty()),
            index: 0,
            depth: 0,
        }
    }

    /// Create a context for the message at `index`, with `this` set to its
    /// structured content
    pub fn for_message(batch: Arc<MessageBatch>, index: usize) -> Self {
        let value = batch.get(index).map(Part::value).unwrap_or_default();
        Self::new(value).with_batch(batch, index)
    }

    /// The current value (`this`)
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Variables in scope
    pub fn variables(&self) -> &Arc<Variables> {
        &self.variables
    }

    /// Look up a variable by name
    pub fn variable(&self, name: &str) -> EvaluationResult<&Value> {
        self.variables
            .get(name)
            .ok_or_else(|| EvaluationError::VariableNotFound {
                name: name.to_string(),
            })
    }

    /// Named mappings in scope
    pub fn maps(&self) -> &Arc<NamedMappings> {
        &self.maps
    }

    /// The in-flight batch
    pub fn batch(&self) -> &Arc<MessageBatch> {
        &self.batch
    }

    /// Index of the message being processed
    pub fn index(&self) -> usize {
        self.index
    }

    /// The message being processed
    pub fn message(&self) -> EvaluationResult<&Part> {
        self.batch.get(self.index).ok_or(EvaluationError::NoMessage {
            index: self.index,
            size: self.batch.len(),
        })
    }

    /// Number of mappings entered to reach this context
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Same context one mapping deeper, failing once the nesting limit is
    /// reached
    pub fn enter_mapping(&self) -> EvaluationResult<Self> {
        if self.depth >= MAX_MAPPING_DEPTH {
            return Err(EvaluationError::RecursionLimit {
                limit: MAX_MAPPING_DEPTH,
            });
        }
        Ok(Self {
            depth: self.depth + 1,
            ..self.clone()
        })
    }

    /// Fresh context over `value` that keeps only the nesting depth of
    /// `self`
    pub fn isolated(&self, value: Value) -> Self {
        Self {
            depth: self.depth,
            ..Self::new(value)
        }
    }

    /// Same context with a new current value
    pub fn with_value(&self, value: Value) -> Self {
        Self {
            value: Arc::new(value),
            ..self.clone()
        }
    }

    /// Same context with a different variable set
    pub fn with_variables(&self, variables: Arc<Variables>) -> Self {
        Self {
            variables,
            ..self.clone()
        }
    }

    /// Same context with a different named mapping set
    pub fn with_maps(&self, maps: Arc<NamedMappings>) -> Self {
        Self {
            maps,
            ..self.clone()
        }
    }

    /// Same context pointed at a message within a batch
    pub fn with_batch(&self, batch: Arc<MessageBatch>, index: usize) -> Self {
        Self {
            batch,
            index,
            ..self.clone()
        }
    }
}
