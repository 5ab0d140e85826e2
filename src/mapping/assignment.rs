//! Assignment targets and mapping statements

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::model::{Object, Value};
use crate::query::{EvaluationError, EvaluationResult, FunctionRef, Variables};

/// Where the result of a statement is written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignmentTarget {
    /// A path within the output document; empty means the whole document
    Value(Vec<String>),
    /// A `let` variable
    Variable(String),
    /// A metadata key, or all metadata when `None`
    Metadata(Option<String>),
}

impl fmt::Display for AssignmentTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssignmentTarget::Value(path) if path.is_empty() => f.write_str("root"),
            AssignmentTarget::Value(path) => write!(f, "root.{}", path.join(".")),
            AssignmentTarget::Variable(name) => write!(f, "let {name}"),
            AssignmentTarget::Metadata(Some(key)) => write!(f, "meta {key}"),
            AssignmentTarget::Metadata(None) => f.write_str("meta"),
        }
    }
}

/// Mutable state threaded through the statements of one execution
#[derive(Debug)]
pub struct AssignState<'a> {
    /// Document being built
    pub output: Value,
    /// Variables assigned so far
    pub variables: Arc<Variables>,
    /// Metadata of the message being mapped, when there is one
    pub metadata: Option<&'a mut IndexMap<String, String>>,
}

impl AssignmentTarget {
    /// Write `value` into the state
    pub fn assign(&self, value: Value, state: &mut AssignState<'_>) -> EvaluationResult<()> {
        match self {
            AssignmentTarget::Value(path) => {
                match value {
                    Value::Nothing => {}
                    Value::Delete if path.is_empty() => state.output = Value::Delete,
                    Value::Delete => state.output.delete_path(path),
                    value if path.is_empty() => state.output = value,
                    value => {
                        if !matches!(state.output, Value::Object(_)) {
                            state.output = Value::Object(Object::new());
                        }
                        state.output.set_path(path, value);
                    }
                }
                Ok(())
            }
            AssignmentTarget::Variable(name) => {
                match value {
                    Value::Nothing => {}
                    Value::Delete => {
                        Arc::make_mut(&mut state.variables).remove(name);
                    }
                    value => {
                        Arc::make_mut(&mut state.variables).insert(name.clone(), value);
                    }
                }
                Ok(())
            }
            AssignmentTarget::Metadata(key) => {
                let Some(metadata) = state.metadata.as_deref_mut() else {
                    return Err(EvaluationError::function(
                        "meta",
                        "unable to assign metadata in the current context",
                    ));
                };
                match (key, value) {
                    (_, Value::Nothing) => {}
                    (Some(key), Value::Delete) => {
                        metadata.shift_remove(key);
                    }
                    (Some(key), value) => {
                        metadata.insert(key.clone(), value.to_string());
                    }
                    (None, Value::Delete) => metadata.clear(),
                    (None, Value::Object(object)) => {
                        metadata.clear();
                        for (k, v) in object {
                            metadata.insert(k, v.to_string());
                        }
                    }
                    (None, other) => {
                        return Err(EvaluationError::type_mismatch("meta", "object", &other));
                    }
                }
                Ok(())
            }
        }
    }
}

/// One `target = query` statement
#[derive(Debug, Clone)]
pub struct Statement {
    /// Where the result goes
    pub target: AssignmentTarget,
    /// The query producing the value
    pub query: FunctionRef,
    /// 1-based source line, for error reporting
    pub line: usize,
}

impl Statement {
    /// Create a statement
    pub fn new(target: AssignmentTarget, query: FunctionRef, line: usize) -> Self {
        Self {
            target,
            query,
            line,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn state() -> AssignState<'static> {
        AssignState {
            output: Value::Nothing,
            variables: Arc::new(Variables::default()),
            metadata: None,
        }
    }

    fn path(p: &str) -> AssignmentTarget {
        AssignmentTarget::Value(p.split('.').map(String::from).collect())
    }

    #[test]
    fn test_value_assignment_builds_object() {
        let mut state = state();
        path("a.b").assign(Value::Int(1), &mut state).unwrap();
        path("c").assign(Value::from("x"), &mut state).unwrap();
        path("c").assign(Value::Nothing, &mut state).unwrap();
        assert_eq!(state.output, Value::from(json!({"a": {"b": 1}, "c": "x"})));

        path("a").assign(Value::Delete, &mut state).unwrap();
        assert_eq!(state.output, Value::from(json!({"c": "x"})));

        AssignmentTarget::Value(vec![])
            .assign(Value::Delete, &mut state)
            .unwrap();
        assert_eq!(state.output, Value::Delete);
    }

    #[test]
    fn test_variable_assignment_is_copy_on_write() {
        let mut state = state();
        let before = Arc::clone(&state.variables);
        AssignmentTarget::Variable("v".into())
            .assign(Value::Int(3), &mut state)
            .unwrap();
        assert!(before.is_empty());
        assert_eq!(state.variables.get("v"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_metadata_requires_message() {
        let mut state = state();
        let err = AssignmentTarget::Metadata(Some("k".into()))
            .assign(Value::from("v"), &mut state)
            .unwrap_err();
        assert!(err.to_string().contains("unable to assign metadata"));
    }

    #[test]
    fn test_metadata_assignment() {
        let mut meta = IndexMap::new();
        meta.insert("old".to_string(), "1".to_string());
        let mut state = AssignState {
            output: Value::Nothing,
            variables: Arc::new(Variables::default()),
            metadata: Some(&mut meta),
        };
        AssignmentTarget::Metadata(Some("n".into()))
            .assign(Value::Int(5), &mut state)
            .unwrap();
        AssignmentTarget::Metadata(Some("old".into()))
            .assign(Value::Delete, &mut state)
            .unwrap();
        drop(state);
        assert_eq!(meta.get("n").map(String::as_str), Some("5"));
        assert!(!meta.contains_key("old"));
    }
}
