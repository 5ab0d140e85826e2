//! The `bloblang` method: run a mapping supplied as a value
//!
//! The mapping text is compiled against the sandbox context, so it cannot
//! reach the host environment or the message being processed. It runs in a
//! fresh context whose only input is the target value: no variables, no
//! metadata and no batch are visible to it.

use std::sync::Arc;

use log::trace;

use crate::environment::sandbox_context;
use crate::parser::parse_mapping;
use crate::query::{
    Category, ClosureFunction, EvaluationError, Function, MethodEntry, MethodSpec, Param,
};

/// Build the `bloblang` method entry
pub fn bloblang_method() -> MethodEntry {
    MethodEntry::new(
        MethodSpec::new(
            "bloblang",
            Category::Parsing,
            "Executes an argument mapping on the target. Functions that access the environment \
             or the message being processed, such as `env`, `file` and `content`, are not \
             available to the argument mapping.",
        )
        .beta()
        .param(Param::string("mapping", "The mapping to execute."))
        .example(
            "root.body = this.body.bloblang(this.mapping)",
            &[
                (
                    r#"{"body":{"foo":"hello world"},"mapping":"root.foo = this.foo.uppercase()"}"#,
                    r#"{"body":{"foo":"HELLO WORLD"}}"#,
                ),
                (
                    r#"{"body":{"foo":"hello world 2"},"mapping":"root.foo = this.foo.capitalize()"}"#,
                    r#"{"body":{"foo":"Hello World 2"}}"#,
                ),
            ],
        ),
        |target, params| {
            let text = params.field_string("mapping")?;
            trace!("compiling nested mapping ({} bytes)", text.len());
            let mapping = Arc::new(parse_mapping(&sandbox_context(), "bloblang", &text)?);

            let targets = target.query_targets();
            Ok(ClosureFunction::arc(
                "method bloblang",
                move |ctx| {
                    let value = target.exec(ctx)?;
                    let isolated = ctx
                        .isolated(value)
                        .enter_mapping()?
                        .with_maps(Arc::clone(mapping.maps()));
                    mapping
                        .exec(&isolated)
                        .map_err(|e| EvaluationError::NestedMapping(Box::new(e)))
                },
                targets,
            ))
        },
    )
}
