//! Builtin functions
//!
//! Functions are called without a target, e.g. `env("HOME")` or
//! `content()`. Each is registered with a specification whose capability
//! flags decide whether the function is available in restricted parsing
//! contexts.

use chrono::{SecondsFormat, Utc};

use super::error::{BuildError, EvaluationError};
use super::function::{ClosureFunction, Literal, TargetKind, TargetPath};
use super::params::Param;
use super::spec::{Category, FunctionEntry, FunctionSpec};
use crate::model::{Object, Value};

/// Split a dot separated path, ignoring empty segments
pub fn split_path(path: &str) -> Vec<String> {
    path.split('.')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Every builtin function
pub fn builtin_functions() -> Vec<FunctionEntry> {
    vec![
        nothing(),
        deleted(),
        throw(),
        range(),
        env(),
        file(),
        now(),
        timestamp_unix(),
        content(),
        json(),
        meta(),
        batch_index(),
        batch_size(),
    ]
}

fn nothing() -> FunctionEntry {
    FunctionEntry::new(
        FunctionSpec::new(
            "nothing",
            Category::General,
            "Returns a value that leaves the assignment target unchanged.",
        ),
        |_| Ok(Literal::arc(Value::Nothing)),
    )
}

fn deleted() -> FunctionEntry {
    FunctionEntry::new(
        FunctionSpec::new(
            "deleted",
            Category::General,
            "Returns a value that deletes the assignment target. Assigned to `root` it drops the \
             message.",
        )
        .example(
            r#"root = this
root.bar = deleted()"#,
            &[(r#"{"bar":"x","baz":"y"}"#, r#"{"baz":"y"}"#)],
        ),
        |_| Ok(Literal::arc(Value::Delete)),
    )
}

fn throw() -> FunctionEntry {
    FunctionEntry::new(
        FunctionSpec::new(
            "throw",
            Category::General,
            "Fails the mapping with the given error message.",
        )
        .param(Param::string("why", "The error message.")),
        |params| {
            let why = params.field_string("why")?;
            Ok(ClosureFunction::arc(
                "function throw",
                move |_| Err(EvaluationError::Thrown(why.clone())),
                Vec::new(),
            ))
        },
    )
}

fn range() -> FunctionEntry {
    FunctionEntry::new(
        FunctionSpec::new(
            "range",
            Category::General,
            "Creates an array of integers from start (inclusive) to stop (exclusive).",
        )
        .param(Param::int("start", "The first integer."))
        .param(Param::int("stop", "The integer to stop before."))
        .param(Param::int("step", "The increment between integers.").default(1))
        .example("root.a = range(0, 5)", &[("{}", r#"{"a":[0,1,2,3,4]}"#)]),
        |params| {
            let start = params.field_int("start")?;
            let stop = params.field_int("stop")?;
            let step = params.field_int("step")?;
            if step == 0 {
                return Err(BuildError::Invalid("step must not be zero".to_string()));
            }
            if (step > 0 && start > stop) || (step < 0 && start < stop) {
                return Err(BuildError::Invalid(format!(
                    "with step {step}, start {start} can never reach stop {stop}"
                )));
            }
            let len = range_len(start, stop, step);
            if len > MAX_RANGE_LEN {
                return Err(BuildError::Invalid(format!(
                    "range of {len} elements exceeds the limit of {MAX_RANGE_LEN}"
                )));
            }
            let mut values = Vec::with_capacity(len);
            let mut next = Some(start);
            let before_stop = |i: &i64| (step > 0 && *i < stop) || (step < 0 && *i > stop);
            while let Some(i) = next.filter(before_stop) {
                values.push(Value::Int(i));
                next = i.checked_add(step);
            }
            Ok(Literal::arc(Value::Array(values)))
        },
    )
}

/// Largest array `range` will build
const MAX_RANGE_LEN: usize = 1 << 20;

/// Number of elements in `start..stop` by `step`, saturating at `usize::MAX`
fn range_len(start: i64, stop: i64, step: i64) -> usize {
    let span = (i128::from(stop) - i128::from(start)).unsigned_abs();
    let step = i128::from(step).unsigned_abs();
    usize::try_from(span.div_ceil(step)).unwrap_or(usize::MAX)
}

fn env() -> FunctionEntry {
    FunctionEntry::new(
        FunctionSpec::new(
            "env",
            Category::Environment,
            "Returns an environment variable as a string, or null when unset.",
        )
        .param(Param::string("name", "The variable name."))
        .impure(),
        |params| {
            let name = params.field_string("name")?;
            Ok(ClosureFunction::arc(
                "function env",
                move |_| {
                    Ok(std::env::var(&name)
                        .map(Value::String)
                        .unwrap_or(Value::Null))
                },
                Vec::new(),
            ))
        },
    )
}

fn file() -> FunctionEntry {
    FunctionEntry::new(
        FunctionSpec::new(
            "file",
            Category::Environment,
            "Reads a file and returns its contents as bytes.",
        )
        .param(Param::string("path", "The path of the file to read."))
        .impure(),
        |params| {
            let path = params.field_string("path")?;
            Ok(ClosureFunction::arc(
                "function file",
                move |_| {
                    std::fs::read(&path)
                        .map(Value::Bytes)
                        .map_err(|e| EvaluationError::function("function file", e.to_string()))
                },
                Vec::new(),
            ))
        },
    )
}

fn now() -> FunctionEntry {
    FunctionEntry::new(
        FunctionSpec::new(
            "now",
            Category::Timestamps,
            "Returns the current time as an RFC 3339 string.",
        )
        .impure(),
        |_| {
            Ok(ClosureFunction::arc(
                "function now",
                |_| {
                    Ok(Value::String(
                        Utc::now().to_rfc3339_opts(SecondsFormat::AutoSi, true),
                    ))
                },
                Vec::new(),
            ))
        },
    )
}

fn timestamp_unix() -> FunctionEntry {
    FunctionEntry::new(
        FunctionSpec::new(
            "timestamp_unix",
            Category::Timestamps,
            "Returns the current unix timestamp in seconds.",
        )
        .impure(),
        |_| {
            Ok(ClosureFunction::arc(
                "function timestamp_unix",
                |_| Ok(Value::Int(Utc::now().timestamp())),
                Vec::new(),
            ))
        },
    )
}

fn content() -> FunctionEntry {
    FunctionEntry::new(
        FunctionSpec::new(
            "content",
            Category::Message,
            "Returns the raw content of the message being processed.",
        )
        .requires_message(),
        |_| {
            Ok(ClosureFunction::arc(
                "function content",
                |ctx| Ok(Value::Bytes(ctx.message()?.content().to_vec())),
                vec![TargetPath::new(TargetKind::Value, Vec::new())],
            ))
        },
    )
}

fn json() -> FunctionEntry {
    FunctionEntry::new(
        FunctionSpec::new(
            "json",
            Category::Message,
            "Returns a field of the message content parsed as JSON, or the whole document when \
             the path is empty.",
        )
        .param(Param::string("path", "A dot separated path.").default(""))
        .requires_message()
        .example(
            r#"root.doc = json("foo.bar")"#,
            &[(r#"{"foo":{"bar":"x"}}"#, r#"{"doc":"x"}"#)],
        ),
        |params| {
            let path = split_path(&params.field_string("path")?);
            let targets = vec![TargetPath::new(TargetKind::Value, path.clone())];
            Ok(ClosureFunction::arc(
                "function json",
                move |ctx| {
                    let value = ctx.message()?.value();
                    Ok(value.get_path(&path).cloned().unwrap_or(Value::Null))
                },
                targets,
            ))
        },
    )
}

fn meta() -> FunctionEntry {
    FunctionEntry::new(
        FunctionSpec::new(
            "meta",
            Category::Message,
            "Returns a metadata value of the message, or null when absent. Without a key returns \
             all metadata as an object.",
        )
        .param(Param::string("key", "The metadata key.").optional())
        .requires_message(),
        |params| {
            let key = params.field_optional_string("key")?;
            let path = key.iter().cloned().collect();
            Ok(ClosureFunction::arc(
                "function meta",
                move |ctx| {
                    let part = ctx.message()?;
                    Ok(match &key {
                        Some(key) => part
                            .metadata(key)
                            .map(Value::from)
                            .unwrap_or(Value::Null),
                        None => Value::Object(
                            part.metadata_map()
                                .iter()
                                .map(|(k, v)| (k.clone(), Value::from(v.as_str())))
                                .collect::<Object>(),
                        ),
                    })
                },
                vec![TargetPath::new(TargetKind::Metadata, path)],
            ))
        },
    )
}

fn batch_index() -> FunctionEntry {
    FunctionEntry::new(
        FunctionSpec::new(
            "batch_index",
            Category::Message,
            "Returns the index of the message within its batch.",
        )
        .requires_message(),
        |_| {
            Ok(ClosureFunction::arc(
                "function batch_index",
                |ctx| Ok(Value::Int(ctx.index() as i64)),
                Vec::new(),
            ))
        },
    )
}

fn batch_size() -> FunctionEntry {
    FunctionEntry::new(
        FunctionSpec::new(
            "batch_size",
            Category::Message,
            "Returns the number of messages in the batch.",
        )
        .requires_message(),
        |_| {
            Ok(ClosureFunction::arc(
                "function batch_size",
                |ctx| Ok(Value::Int(ctx.batch().len() as i64)),
                Vec::new(),
            ))
        },
    )
}

/// Construct a builtin directly, for tests
#[cfg(test)]
pub(crate) fn build(
    name: &str,
    args: Vec<Value>,
) -> Result<super::function::FunctionRef, BuildError> {
    use super::params::{CallArg, ParsedParams};

    let entry = builtin_functions()
        .into_iter()
        .find(|e| e.spec.name == name)
        .ok_or_else(|| BuildError::Invalid(format!("no function {name}")))?;
    let params: ParsedParams = entry.spec.params.bind(
        args.into_iter()
            .map(|v| CallArg::positional(Literal::arc(v)))
            .collect(),
    )?;
    (entry.ctor)(&params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MessageBatch, Part};
    use crate::query::context::EvaluationContext;
    use crate::query::spec::Capabilities;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn message_ctx() -> EvaluationContext {
        let part = Part::new(r#"{"foo":{"bar":"baz"}}"#).with_metadata("topic", "orders");
        let batch = MessageBatch::new(vec![part, Part::new("second")]);
        EvaluationContext::for_message(Arc::new(batch), 0)
    }

    #[test]
    fn test_capability_flags() {
        for entry in builtin_functions() {
            let name = entry.spec.name.as_str();
            let expect_impure = matches!(name, "env" | "file" | "now" | "timestamp_unix");
            let expect_message = matches!(
                name,
                "content" | "json" | "meta" | "batch_index" | "batch_size"
            );
            assert_eq!(entry.is_pure(), !expect_impure, "{name}");
            assert_eq!(entry.requires_message(), expect_message, "{name}");
        }
    }

    #[test]
    fn test_range() {
        let ctx = EvaluationContext::new(Value::Null);
        let node = build("range", vec![0.into(), 5.into(), 2.into()]).unwrap();
        assert_eq!(
            node.exec(&ctx).unwrap(),
            Value::Array(vec![0.into(), 2.into(), 4.into()])
        );
        let node = build("range", vec![3.into(), 0.into(), (-1).into()]).unwrap();
        assert_eq!(
            node.exec(&ctx).unwrap(),
            Value::Array(vec![3.into(), 2.into(), 1.into()])
        );
        assert!(build("range", vec![0.into(), 5.into(), 0.into()]).is_err());
    }

    #[test]
    fn test_range_near_integer_bounds() {
        let ctx = EvaluationContext::new(Value::Null);
        let node = build("range", vec![(i64::MAX - 1).into(), i64::MAX.into(), 5.into()]);
        assert_eq!(
            node.unwrap().exec(&ctx).unwrap(),
            Value::Array(vec![(i64::MAX - 1).into()])
        );

        let node = build("range", vec![i64::MIN.into(), i64::MAX.into(), i64::MAX.into()]);
        assert_eq!(
            node.unwrap().exec(&ctx).unwrap(),
            Value::Array(vec![i64::MIN.into(), (-1).into(), (i64::MAX - 1).into()])
        );

        let node = build("range", vec![(i64::MIN + 1).into(), i64::MIN.into(), (-3).into()]);
        assert_eq!(
            node.unwrap().exec(&ctx).unwrap(),
            Value::Array(vec![(i64::MIN + 1).into()])
        );
    }

    #[test]
    fn test_range_length_is_capped() {
        assert!(matches!(
            build("range", vec![0.into(), i64::MAX.into()]),
            Err(BuildError::Invalid(_))
        ));
        let node = build("range", vec![0.into(), (MAX_RANGE_LEN as i64).into()]).unwrap();
        let len = node.exec(&EvaluationContext::new(Value::Null)).unwrap();
        assert_eq!(len.as_array().map(<[Value]>::len), Some(MAX_RANGE_LEN));
    }

    #[test]
    fn test_throw() {
        let node = build("throw", vec!["nope".into()]).unwrap();
        assert_eq!(
            node.exec(&EvaluationContext::new(Value::Null)).unwrap_err(),
            EvaluationError::Thrown("nope".into())
        );
    }

    #[test]
    fn test_message_functions() {
        let ctx = message_ctx();
        assert_eq!(
            build("json", vec!["foo.bar".into()]).unwrap().exec(&ctx).unwrap(),
            Value::from("baz")
        );
        assert_eq!(
            build("meta", vec!["topic".into()]).unwrap().exec(&ctx).unwrap(),
            Value::from("orders")
        );
        assert_eq!(
            build("meta", vec!["missing".into()]).unwrap().exec(&ctx).unwrap(),
            Value::Null
        );
        assert_eq!(
            build("batch_size", vec![]).unwrap().exec(&ctx).unwrap(),
            Value::Int(2)
        );
        assert_eq!(
            build("content", vec![]).unwrap().exec(&ctx).unwrap(),
            Value::Bytes(br#"{"foo":{"bar":"baz"}}"#.to_vec())
        );
    }

    #[test]
    fn test_message_functions_without_message() {
        let ctx = EvaluationContext::new(Value::Null);
        assert!(matches!(
            build("content", vec![]).unwrap().exec(&ctx),
            Err(EvaluationError::NoMessage { .. })
        ));
    }

    #[test]
    fn test_env() {
        unsafe {
            std::env::set_var("BLOBLANG_TEST_ENV_FN", "present");
        }
        let ctx = EvaluationContext::new(Value::Null);
        let node = build("env", vec!["BLOBLANG_TEST_ENV_FN".into()]).unwrap();
        assert_eq!(node.exec(&ctx).unwrap(), Value::from("present"));
        let node = build("env", vec!["BLOBLANG_TEST_ENV_FN_UNSET".into()]).unwrap();
        assert_eq!(node.exec(&ctx).unwrap(), Value::Null);
    }
}
