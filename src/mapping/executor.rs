//! Execution of compiled mappings

use std::sync::Arc;

use super::assignment::{AssignState, Statement};
use crate::model::{MessageBatch, Part, Value};
use crate::query::{
    EvaluationContext, EvaluationError, EvaluationResult, Function, NamedMappings, TargetPath,
};

/// A compiled mapping: an ordered list of statements plus the named
/// mappings it was compiled with.
///
/// A mapping is itself an executable node. Executing it yields the document
/// built by its statements, starting from `Nothing`, so a mapping that
/// assigns nothing leaves its caller's value untouched.
#[derive(Debug, Clone)]
pub struct Mapping {
    name: String,
    statements: Vec<Statement>,
    maps: Arc<NamedMappings>,
}

impl Mapping {
    /// Create a mapping from compiled statements
    pub fn new(
        name: impl Into<String>,
        statements: Vec<Statement>,
        maps: Arc<NamedMappings>,
    ) -> Self {
        Self {
            name: name.into(),
            statements,
            maps,
        }
    }

    /// Name the mapping was compiled under
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Statements in execution order
    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    /// Named mappings: caller-supplied plus those declared in the text
    pub fn maps(&self) -> &Arc<NamedMappings> {
        &self.maps
    }

    fn run(
        &self,
        ctx: &EvaluationContext,
        mut state: AssignState<'_>,
    ) -> EvaluationResult<Value> {
        for statement in &self.statements {
            let scoped = ctx.with_variables(Arc::clone(&state.variables));
            statement
                .query
                .exec(&scoped)
                .and_then(|value| statement.target.assign(value, &mut state))
                .map_err(|source| EvaluationError::Assignment {
                    line: statement.line,
                    source: Box::new(source),
                })?;
        }
        Ok(state.output)
    }

    /// Run the mapping against a standalone value, without a message
    pub fn exec_value(&self, value: Value) -> EvaluationResult<Value> {
        let ctx = EvaluationContext::new(value).with_maps(Arc::clone(&self.maps));
        self.exec(&ctx)
    }

    /// Map one message of a batch.
    ///
    /// Returns `None` when the mapping deletes the message. Metadata
    /// statements operate on the returned part's metadata.
    pub fn map_part(
        &self,
        index: usize,
        batch: &Arc<MessageBatch>,
    ) -> EvaluationResult<Option<Part>> {
        let ctx = EvaluationContext::for_message(Arc::clone(batch), index)
            .with_maps(Arc::clone(&self.maps));
        let mut part = ctx.message()?.clone();

        let state = AssignState {
            output: Value::Nothing,
            variables: Arc::clone(ctx.variables()),
            metadata: Some(part.metadata_mut()),
        };
        match self.run(&ctx, state)? {
            Value::Nothing => Ok(Some(part)),
            Value::Delete => Ok(None),
            value => {
                part.set_content(value.to_bytes());
                Ok(Some(part))
            }
        }
    }
}

impl Function for Mapping {
    fn exec(&self, ctx: &EvaluationContext) -> EvaluationResult<Value> {
        let state = AssignState {
            output: Value::Nothing,
            variables: Arc::clone(ctx.variables()),
            metadata: None,
        };
        self.run(ctx, state)
    }

    fn query_targets(&self) -> Vec<TargetPath> {
        self.statements
            .iter()
            .flat_map(|s| s.query.query_targets())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Environment;
    use crate::parser::parse_mapping;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn compile(text: &str) -> Mapping {
        parse_mapping(&Environment::standard().parsing_context(), "test", text).unwrap()
    }

    #[test]
    fn test_exec_value() {
        let mapping = compile("root.a = this.x + 1\nroot.b = \"fixed\"");
        assert_eq!(
            mapping.exec_value(Value::from(json!({"x": 1}))).unwrap(),
            Value::from(json!({"a": 2, "b": "fixed"}))
        );
    }

    #[test]
    fn test_empty_output_is_nothing() {
        let mapping = compile("let a = 1");
        assert_eq!(mapping.exec_value(Value::Null).unwrap(), Value::Nothing);
    }

    #[test]
    fn test_failure_reports_line() {
        let mapping = compile("root.a = 1\nroot.b = throw(\"boom\")");
        match mapping.exec_value(Value::Null).unwrap_err() {
            EvaluationError::Assignment { line, source } => {
                assert_eq!(line, 2);
                assert!(source.to_string().contains("boom"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_map_part_content_and_metadata() {
        let batch = Arc::new(MessageBatch::new(vec![
            Part::new(r#"{"name":"ada"}"#).with_metadata("source", "test"),
        ]));
        let mapping = compile(
            "meta greeting = \"hi \" + this.name\n\
             meta source = deleted()\n\
             root.upper = this.name.uppercase()",
        );

        let part = mapping.map_part(0, &batch).unwrap().unwrap();
        assert_eq!(part.content(), br#"{"upper":"ADA"}"#);
        assert_eq!(part.metadata("greeting"), Some("hi ada"));
        assert_eq!(part.metadata("source"), None);
        assert_eq!(batch.get(0).unwrap().metadata("source"), Some("test"));
    }

    #[test]
    fn test_map_part_deleted_and_untouched() {
        let batch = Arc::new(MessageBatch::new(vec![Part::new("raw")]));
        assert!(compile("root = deleted()").map_part(0, &batch).unwrap().is_none());

        let part = compile("meta k = \"v\"").map_part(0, &batch).unwrap().unwrap();
        assert_eq!(part.content(), b"raw");
        assert_eq!(part.metadata("k"), Some("v"));
    }

    #[test]
    fn test_metadata_outside_message_fails() {
        let mapping = compile("meta k = \"v\"");
        assert!(mapping.exec_value(Value::Null).is_err());
    }

    #[test]
    fn test_query_targets() {
        let mapping = compile("root.a = this.foo\nroot.b = $bar");
        let targets = mapping.query_targets();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].path, vec!["foo".to_string()]);
    }
}
