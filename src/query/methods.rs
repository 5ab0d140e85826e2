//! Builtin methods
//!
//! Methods are invoked on the result of a target query, e.g.
//! `this.name.uppercase()`. A method constructor receives its target node
//! and bound arguments and returns a node that evaluates the target first.

use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use regex::Regex;
use serde::Serialize;

use super::context::EvaluationContext;
use super::error::{BuildError, EvaluationError, EvaluationResult};
use super::function::{ClosureFunction, FunctionRef};
use super::operators::{self, BinaryOp, values_equal};
use super::params::Param;
use super::spec::{Category, MethodEntry, MethodSpec};
use crate::model::{Object, Value};

/// Every builtin method except those registered by plugins
pub fn builtin_methods() -> Vec<MethodEntry> {
    vec![
        uppercase(),
        lowercase(),
        capitalize(),
        trim(),
        length(),
        contains(),
        has_prefix(),
        has_suffix(),
        replace(),
        split(),
        join(),
        re_match(),
        re_replace(),
        encode(),
        decode(),
        string(),
        number(),
        bool_method(),
        type_method(),
        not_null(),
        keys(),
        values(),
        index(),
        sum(),
        map_each(),
        filter(),
        catch(),
        or(),
        apply(),
        parse_json(),
        format_json(),
    ]
}

/// Wrap a value transformation as a method node over `target`
fn value_method<F>(name: &str, target: FunctionRef, f: F) -> FunctionRef
where
    F: Fn(Value) -> EvaluationResult<Value> + Send + Sync + 'static,
{
    let targets = target.query_targets();
    ClosureFunction::arc(
        format!("method {name}"),
        move |ctx| f(target.exec(ctx)?),
        targets,
    )
}

fn text(method: &str, value: &Value) -> EvaluationResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Bytes(b) => Ok(String::from_utf8_lossy(b).into_owned()),
        other => Err(EvaluationError::type_mismatch(
            format!("method {method}"),
            "string",
            other,
        )),
    }
}

fn string_method(
    name: &'static str,
    description: &str,
    f: fn(&str) -> String,
) -> MethodEntry {
    MethodEntry::new(
        MethodSpec::new(name, Category::Strings, description),
        move |target, _| {
            Ok(value_method(name, target, move |v| {
                Ok(Value::String(f(&text(name, &v)?)))
            }))
        },
    )
}

fn uppercase() -> MethodEntry {
    string_method("uppercase", "Converts all letters to upper case.", str::to_uppercase)
}

fn lowercase() -> MethodEntry {
    string_method("lowercase", "Converts all letters to lower case.", str::to_lowercase)
}

fn trim() -> MethodEntry {
    string_method(
        "trim",
        "Removes leading and trailing whitespace.",
        |s| s.trim().to_string(),
    )
}

fn capitalize() -> MethodEntry {
    string_method(
        "capitalize",
        "Converts the first letter of every word to upper case.",
        title_case,
    )
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if at_word_start && c.is_alphabetic() {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        at_word_start = !c.is_alphanumeric() && c != '_' && c != '\'';
    }
    out
}

fn length() -> MethodEntry {
    MethodEntry::new(
        MethodSpec::new(
            "length",
            Category::ObjectArray,
            "Returns the length of a string, bytes, array or object.",
        ),
        |target, _| {
            Ok(value_method("length", target, |v| {
                let len = match &v {
                    Value::String(s) => s.len(),
                    Value::Bytes(b) => b.len(),
                    Value::Array(a) => a.len(),
                    Value::Object(o) => o.len(),
                    other => {
                        return Err(EvaluationError::type_mismatch(
                            "method length",
                            "string, bytes, array or object",
                            other,
                        ));
                    }
                };
                Ok(Value::Int(len as i64))
            }))
        },
    )
}

fn contains() -> MethodEntry {
    MethodEntry::new(
        MethodSpec::new(
            "contains",
            Category::ObjectArray,
            "Checks whether a string contains a substring, or an array or object contains a value.",
        )
        .param(Param::any("value", "The value to search for.")),
        |target, params| {
            let needle = params.field_value("value")?.clone();
            Ok(value_method("contains", target, move |v| {
                let found = match (&v, &needle) {
                    (Value::String(s), Value::String(n)) => s.contains(n.as_str()),
                    (Value::Bytes(b), Value::String(n)) => {
                        String::from_utf8_lossy(b).contains(n.as_str())
                    }
                    (Value::Array(a), n) => a.iter().any(|e| values_equal(e, n)),
                    (Value::Object(o), n) => o.values().any(|e| values_equal(e, n)),
                    (other, _) => {
                        return Err(EvaluationError::type_mismatch(
                            "method contains",
                            "string, array or object",
                            other,
                        ));
                    }
                };
                Ok(Value::Bool(found))
            }))
        },
    )
}

fn has_prefix() -> MethodEntry {
    MethodEntry::new(
        MethodSpec::new(
            "has_prefix",
            Category::Strings,
            "Checks whether a string starts with a prefix.",
        )
        .param(Param::string("value", "The prefix.")),
        |target, params| {
            let prefix = params.field_string("value")?;
            Ok(value_method("has_prefix", target, move |v| {
                Ok(Value::Bool(text("has_prefix", &v)?.starts_with(&prefix)))
            }))
        },
    )
}

fn has_suffix() -> MethodEntry {
    MethodEntry::new(
        MethodSpec::new(
            "has_suffix",
            Category::Strings,
            "Checks whether a string ends with a suffix.",
        )
        .param(Param::string("value", "The suffix.")),
        |target, params| {
            let suffix = params.field_string("value")?;
            Ok(value_method("has_suffix", target, move |v| {
                Ok(Value::Bool(text("has_suffix", &v)?.ends_with(&suffix)))
            }))
        },
    )
}

fn replace() -> MethodEntry {
    MethodEntry::new(
        MethodSpec::new("replace", Category::Strings, "Replaces every occurrence of a substring.")
            .param(Param::string("old", "The substring to replace."))
            .param(Param::string("new", "The replacement.")),
        |target, params| {
            let old = params.field_string("old")?;
            let new = params.field_string("new")?;
            Ok(value_method("replace", target, move |v| {
                Ok(Value::String(text("replace", &v)?.replace(&old, &new)))
            }))
        },
    )
}

fn split() -> MethodEntry {
    MethodEntry::new(
        MethodSpec::new("split", Category::Strings, "Splits a string into an array of strings.")
            .param(Param::string("delimiter", "The delimiter to split on."))
            .example(
                r#"root.parts = this.value.split(",")"#,
                &[(r#"{"value":"a,b,c"}"#, r#"{"parts":["a","b","c"]}"#)],
            ),
        |target, params| {
            let delimiter = params.field_string("delimiter")?;
            Ok(value_method("split", target, move |v| {
                Ok(Value::Array(
                    text("split", &v)?
                        .split(delimiter.as_str())
                        .map(Value::from)
                        .collect(),
                ))
            }))
        },
    )
}

fn join() -> MethodEntry {
    MethodEntry::new(
        MethodSpec::new(
            "join",
            Category::ObjectArray,
            "Joins an array of strings with a delimiter.",
        )
        .param(
            Param::string("delimiter", "The delimiter placed between elements.").default(""),
        ),
        |target, params| {
            let delimiter = params.field_string("delimiter")?;
            Ok(value_method("join", target, move |v| match v {
                Value::Array(items) => {
                    let parts = items
                        .iter()
                        .map(|e| text("join", e))
                        .collect::<EvaluationResult<Vec<_>>>()?;
                    Ok(Value::String(parts.join(&delimiter)))
                }
                other => Err(EvaluationError::type_mismatch("method join", "array", &other)),
            }))
        },
    )
}

fn compile_regex(pattern: &str) -> Result<Regex, BuildError> {
    Regex::new(pattern).map_err(|e| BuildError::Invalid(format!("invalid regular expression: {e}")))
}

fn re_match() -> MethodEntry {
    MethodEntry::new(
        MethodSpec::new(
            "re_match",
            Category::Strings,
            "Checks whether a regular expression matches any part of a string.",
        )
        .param(Param::string("pattern", "The regular expression.")),
        |target, params| {
            let re = compile_regex(&params.field_string("pattern")?)?;
            Ok(value_method("re_match", target, move |v| {
                Ok(Value::Bool(re.is_match(&text("re_match", &v)?)))
            }))
        },
    )
}

fn re_replace() -> MethodEntry {
    MethodEntry::new(
        MethodSpec::new(
            "re_replace",
            Category::Strings,
            "Replaces every match of a regular expression. The replacement may reference capture \
             groups as `$1`.",
        )
        .param(Param::string("pattern", "The regular expression."))
        .param(Param::string("value", "The replacement.")),
        |target, params| {
            let re = compile_regex(&params.field_string("pattern")?)?;
            let replacement = params.field_string("value")?;
            Ok(value_method("re_replace", target, move |v| {
                Ok(Value::String(
                    re.replace_all(&text("re_replace", &v)?, replacement.as_str())
                        .into_owned(),
                ))
            }))
        },
    )
}

#[derive(Debug, Clone, Copy)]
enum Scheme {
    Base64,
    Base64Url,
    Hex,
}

impl Scheme {
    fn parse(name: &str) -> Result<Self, BuildError> {
        match name {
            "base64" => Ok(Scheme::Base64),
            "base64url" => Ok(Scheme::Base64Url),
            "hex" => Ok(Scheme::Hex),
            other => Err(BuildError::Invalid(format!("unrecognised scheme: {other}"))),
        }
    }
}

fn raw_bytes(method: &str, value: &Value) -> EvaluationResult<Vec<u8>> {
    match value {
        Value::String(s) => Ok(s.as_bytes().to_vec()),
        Value::Bytes(b) => Ok(b.clone()),
        other => Err(EvaluationError::type_mismatch(
            format!("method {method}"),
            "string or bytes",
            other,
        )),
    }
}

fn encode() -> MethodEntry {
    MethodEntry::new(
        MethodSpec::new(
            "encode",
            Category::Encoding,
            "Encodes a string or bytes with a scheme: base64, base64url or hex.",
        )
        .param(Param::string("scheme", "The encoding scheme.")),
        |target, params| {
            let scheme = Scheme::parse(&params.field_string("scheme")?)?;
            Ok(value_method("encode", target, move |v| {
                let bytes = raw_bytes("encode", &v)?;
                Ok(Value::String(match scheme {
                    Scheme::Base64 => STANDARD.encode(bytes),
                    Scheme::Base64Url => URL_SAFE.encode(bytes),
                    Scheme::Hex => hex::encode(bytes),
                }))
            }))
        },
    )
}

fn decode() -> MethodEntry {
    MethodEntry::new(
        MethodSpec::new(
            "decode",
            Category::Encoding,
            "Decodes a string with a scheme: base64, base64url or hex.",
        )
        .param(Param::string("scheme", "The encoding scheme.")),
        |target, params| {
            let scheme = Scheme::parse(&params.field_string("scheme")?)?;
            Ok(value_method("decode", target, move |v| {
                let bytes = raw_bytes("decode", &v)?;
                let decoded = match scheme {
                    Scheme::Base64 => STANDARD.decode(bytes).map_err(|e| e.to_string()),
                    Scheme::Base64Url => URL_SAFE.decode(bytes).map_err(|e| e.to_string()),
                    Scheme::Hex => hex::decode(bytes).map_err(|e| e.to_string()),
                };
                decoded
                    .map(Value::Bytes)
                    .map_err(|e| EvaluationError::function("method decode", e))
            }))
        },
    )
}

fn string() -> MethodEntry {
    MethodEntry::new(
        MethodSpec::new(
            "string",
            Category::Coercion,
            "Converts a value to a string. Structured values are serialised as JSON.",
        ),
        |target, _| Ok(value_method("string", target, |v| Ok(Value::String(v.to_string())))),
    )
}

fn number() -> MethodEntry {
    MethodEntry::new(
        MethodSpec::new("number", Category::Coercion, "Parses a string as a number."),
        |target, _| {
            Ok(value_method("number", target, |v| match v {
                Value::Int(_) | Value::Float(_) => Ok(v),
                Value::String(_) | Value::Bytes(_) => {
                    let s = text("number", &v)?;
                    let s = s.trim();
                    s.parse::<i64>()
                        .map(Value::Int)
                        .or_else(|_| s.parse::<f64>().map(Value::Float))
                        .map_err(|_| {
                            EvaluationError::function(
                                "method number",
                                format!("unable to parse '{s}' as a number"),
                            )
                        })
                }
                other => Err(EvaluationError::type_mismatch(
                    "method number",
                    "number or string",
                    &other,
                )),
            }))
        },
    )
}

fn bool_method() -> MethodEntry {
    MethodEntry::new(
        MethodSpec::new(
            "bool",
            Category::Coercion,
            "Converts a value to a boolean. Numbers are true when non-zero.",
        ),
        |target, _| {
            Ok(value_method("bool", target, |v| match &v {
                Value::Bool(b) => Ok(Value::Bool(*b)),
                Value::Int(_) | Value::Float(_) => Ok(Value::Bool(v.as_f64() != Some(0.0))),
                Value::String(s) => match s.as_str() {
                    "true" => Ok(Value::Bool(true)),
                    "false" => Ok(Value::Bool(false)),
                    _ => Err(EvaluationError::function(
                        "method bool",
                        format!("unable to parse '{s}' as a bool"),
                    )),
                },
                other => Err(EvaluationError::type_mismatch(
                    "method bool",
                    "bool, number or string",
                    other,
                )),
            }))
        },
    )
}

fn type_method() -> MethodEntry {
    MethodEntry::new(
        MethodSpec::new("type", Category::General, "Returns the type of a value as a string."),
        |target, _| Ok(value_method("type", target, |v| Ok(Value::from(v.type_name())))),
    )
}

fn not_null() -> MethodEntry {
    MethodEntry::new(
        MethodSpec::new(
            "not_null",
            Category::General,
            "Fails when the value is null, otherwise returns it.",
        ),
        |target, _| {
            Ok(value_method("not_null", target, |v| {
                if v.is_null() {
                    Err(EvaluationError::function("method not_null", "value is null"))
                } else {
                    Ok(v)
                }
            }))
        },
    )
}

fn keys() -> MethodEntry {
    MethodEntry::new(
        MethodSpec::new("keys", Category::ObjectArray, "Returns the keys of an object, sorted."),
        |target, _| {
            Ok(value_method("keys", target, |v| match v {
                Value::Object(o) => {
                    let mut keys: Vec<_> = o.keys().cloned().collect();
                    keys.sort();
                    Ok(Value::Array(keys.into_iter().map(Value::String).collect()))
                }
                other => Err(EvaluationError::type_mismatch("method keys", "object", &other)),
            }))
        },
    )
}

fn values() -> MethodEntry {
    MethodEntry::new(
        MethodSpec::new("values", Category::ObjectArray, "Returns the values of an object."),
        |target, _| {
            Ok(value_method("values", target, |v| match v {
                Value::Object(o) => Ok(Value::Array(o.into_values().collect())),
                other => Err(EvaluationError::type_mismatch("method values", "object", &other)),
            }))
        },
    )
}

fn index() -> MethodEntry {
    MethodEntry::new(
        MethodSpec::new(
            "index",
            Category::ObjectArray,
            "Returns the element of an array at an index. Negative indexes count from the end.",
        )
        .param(Param::int("index", "The index.")),
        |target, params| {
            let index = params.field_int("index")?;
            Ok(value_method("index", target, move |v| match v {
                Value::Array(mut items) => {
                    let len = items.len() as i64;
                    let resolved = if index < 0 { len + index } else { index };
                    if resolved < 0 || resolved >= len {
                        return Err(EvaluationError::function(
                            "method index",
                            format!("index {index} out of bounds for array of length {len}"),
                        ));
                    }
                    Ok(items.swap_remove(resolved as usize))
                }
                other => Err(EvaluationError::type_mismatch("method index", "array", &other)),
            }))
        },
    )
}

fn sum() -> MethodEntry {
    MethodEntry::new(
        MethodSpec::new("sum", Category::Numbers, "Sums an array of numbers."),
        |target, _| {
            Ok(value_method("sum", target, |v| match v {
                Value::Array(items) => {
                    let mut total = Value::Int(0);
                    for item in &items {
                        if !matches!(item, Value::Int(_) | Value::Float(_)) {
                            return Err(EvaluationError::type_mismatch(
                                "method sum",
                                "number",
                                item,
                            ));
                        }
                        total = operators::apply(BinaryOp::Add, &total, item)?;
                    }
                    Ok(total)
                }
                other => Err(EvaluationError::type_mismatch("method sum", "array", &other)),
            }))
        },
    )
}

fn key_value(key: &str, value: Value) -> Value {
    let mut o = Object::with_capacity(2);
    o.insert("key".to_string(), Value::from(key));
    o.insert("value".to_string(), value);
    Value::Object(o)
}

fn map_each() -> MethodEntry {
    MethodEntry::new(
        MethodSpec::new(
            "map_each",
            Category::ObjectArray,
            "Applies a query to each element of an array, or each value of an object. Object \
             elements are presented as `{\"key\", \"value\"}` and the query result replaces the \
             value. A `deleted()` result removes the element.",
        )
        .param(Param::query("query", "The query applied to each element."))
        .example(
            "root.new = this.things.map_each(this.uppercase())",
            &[(r#"{"things":["a","b"]}"#, r#"{"new":["A","B"]}"#)],
        ),
        |target, params| {
            let query = params.field_query("query")?;
            let targets = target.query_targets();
            Ok(ClosureFunction::arc(
                "method map_each",
                move |ctx| match target.exec(ctx)? {
                    Value::Array(items) => {
                        let mut out = Vec::with_capacity(items.len());
                        for item in items {
                            match query.exec(&ctx.with_value(item.clone()))? {
                                Value::Delete => {}
                                Value::Nothing => out.push(item),
                                v => out.push(v),
                            }
                        }
                        Ok(Value::Array(out))
                    }
                    Value::Object(entries) => {
                        let mut out = Object::with_capacity(entries.len());
                        for (k, v) in entries {
                            match query.exec(&ctx.with_value(key_value(&k, v.clone())))? {
                                Value::Delete => {}
                                Value::Nothing => {
                                    out.insert(k, v);
                                }
                                mapped => {
                                    out.insert(k, mapped);
                                }
                            }
                        }
                        Ok(Value::Object(out))
                    }
                    other => Err(EvaluationError::type_mismatch(
                        "method map_each",
                        "array or object",
                        &other,
                    )),
                },
                targets,
            ))
        },
    )
}

fn filter_test(query: &FunctionRef, ctx: &EvaluationContext) -> EvaluationResult<bool> {
    match query.exec(ctx)? {
        Value::Bool(b) => Ok(b),
        other => Err(EvaluationError::type_mismatch("method filter", "bool", &other)),
    }
}

fn filter() -> MethodEntry {
    MethodEntry::new(
        MethodSpec::new(
            "filter",
            Category::ObjectArray,
            "Keeps the elements of an array, or entries of an object, for which a query returns \
             true.",
        )
        .param(Param::query("test", "A query returning a boolean."))
        .example(
            "root.big = this.nums.filter(this > 10)",
            &[(r#"{"nums":[3,11,4,17]}"#, r#"{"big":[11,17]}"#)],
        ),
        |target, params| {
            let test = params.field_query("test")?;
            let targets = target.query_targets();
            Ok(ClosureFunction::arc(
                "method filter",
                move |ctx| match target.exec(ctx)? {
                    Value::Array(items) => {
                        let mut out = Vec::new();
                        for item in items {
                            if filter_test(&test, &ctx.with_value(item.clone()))? {
                                out.push(item);
                            }
                        }
                        Ok(Value::Array(out))
                    }
                    Value::Object(entries) => {
                        let mut out = Object::new();
                        for (k, v) in entries {
                            if filter_test(&test, &ctx.with_value(key_value(&k, v.clone())))? {
                                out.insert(k, v);
                            }
                        }
                        Ok(Value::Object(out))
                    }
                    other => Err(EvaluationError::type_mismatch(
                        "method filter",
                        "array or object",
                        &other,
                    )),
                },
                targets,
            ))
        },
    )
}

fn catch() -> MethodEntry {
    MethodEntry::new(
        MethodSpec::new(
            "catch",
            Category::ErrorHandling,
            "Returns the target unless it fails, in which case the fallback query is evaluated \
             with the error message as its context.",
        )
        .param(Param::query("fallback", "The query evaluated on failure.")),
        |target, params| {
            let fallback = params.field_query("fallback")?;
            let mut targets = target.query_targets();
            targets.extend(fallback.query_targets());
            Ok(ClosureFunction::arc(
                "method catch",
                move |ctx| match target.exec(ctx) {
                    Ok(v) => Ok(v),
                    Err(e) => fallback.exec(&ctx.with_value(Value::String(e.to_string()))),
                },
                targets,
            ))
        },
    )
}

fn or() -> MethodEntry {
    MethodEntry::new(
        MethodSpec::new(
            "or",
            Category::ErrorHandling,
            "Returns the target unless it fails or is null, in which case the fallback query is \
             returned.",
        )
        .param(Param::query("fallback", "The query evaluated on failure.")),
        |target, params| {
            let fallback = params.field_query("fallback")?;
            let mut targets = target.query_targets();
            targets.extend(fallback.query_targets());
            Ok(ClosureFunction::arc(
                "method or",
                move |ctx| match target.exec(ctx) {
                    Ok(Value::Null) | Err(_) => fallback.exec(ctx),
                    Ok(v) => Ok(v),
                },
                targets,
            ))
        },
    )
}

fn apply() -> MethodEntry {
    MethodEntry::new(
        MethodSpec::new(
            "apply",
            Category::General,
            "Executes a named mapping declared with `map name { ... }` against the target.",
        )
        .param(Param::string("mapping", "The name of the mapping.")),
        |target, params| {
            let name = params.field_string("mapping")?;
            let targets = target.query_targets();
            Ok(ClosureFunction::arc(
                "method apply",
                move |ctx| {
                    let value = target.exec(ctx)?;
                    let mapping = ctx.maps().get(&name).cloned().ok_or_else(|| {
                        EvaluationError::MappingNotFound { name: name.clone() }
                    })?;
                    mapping.exec(&ctx.enter_mapping()?.with_value(value))
                },
                targets,
            ))
        },
    )
}

fn parse_json() -> MethodEntry {
    MethodEntry::new(
        MethodSpec::new(
            "parse_json",
            Category::Parsing,
            "Parses a string or bytes as a JSON document.",
        ),
        |target, _| {
            Ok(value_method("parse_json", target, |v| {
                let bytes = raw_bytes("parse_json", &v)?;
                serde_json::from_slice::<serde_json::Value>(&bytes)
                    .map(Value::from)
                    .map_err(|e| EvaluationError::function("method parse_json", e.to_string()))
            }))
        },
    )
}

fn format_json() -> MethodEntry {
    MethodEntry::new(
        MethodSpec::new(
            "format_json",
            Category::Parsing,
            "Serialises a value as JSON. An empty indent produces compact output.",
        )
        .param(Param::string("indent", "Indentation for each level.").default("    ")),
        |target, params| {
            let indent = params.field_string("indent")?;
            Ok(value_method("format_json", target, move |v| {
                let json = v.to_json();
                if indent.is_empty() {
                    return Ok(Value::String(json.to_string()));
                }
                let mut buf = Vec::new();
                let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
                let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
                json.serialize(&mut ser)
                    .map_err(|e| EvaluationError::function("method format_json", e.to_string()))?;
                Ok(Value::String(String::from_utf8_lossy(&buf).into_owned()))
            }))
        },
    )
}

/// Construct a builtin method over a literal target, for tests
#[cfg(test)]
pub(crate) fn build(
    name: &str,
    target: FunctionRef,
    args: Vec<FunctionRef>,
) -> Result<FunctionRef, BuildError> {
    use super::params::CallArg;

    let entry = builtin_methods()
        .into_iter()
        .find(|e| e.spec.name == name)
        .ok_or_else(|| BuildError::Invalid(format!("no method {name}")))?;
    let params = entry
        .spec
        .params
        .bind(args.into_iter().map(CallArg::positional).collect())?;
    (entry.ctor)(target, &params)
}
