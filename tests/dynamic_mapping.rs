//! Integration tests for mappings executed from within other mappings

use bloblang::environment::{self, sandbox_context};
use bloblang::query::{
    BuildError, Category, ClosureFunction, EvaluationError, FunctionEntry, FunctionSpec,
};
use bloblang::{Mapping, MessageBatch, ParseError, Part, Value, parse_mapping};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::json;
use std::sync::Arc;
use std::thread;

fn compile(text: &str) -> Mapping {
    parse_mapping(&environment::parsing_context(), "test", text).unwrap()
}

fn run(mapping: &str, input: serde_json::Value) -> Result<Value, EvaluationError> {
    compile(mapping).exec_value(Value::from(input))
}

#[rstest]
#[case(
    json!({"body": {"foo": "hello world"}, "mapping": "root.foo = this.foo.uppercase()"}),
    json!({"body": {"foo": "HELLO WORLD"}})
)]
#[case(
    json!({"body": {"foo": "hello world 2"}, "mapping": "root.foo = this.foo.capitalize()"}),
    json!({"body": {"foo": "Hello World 2"}})
)]
fn test_documented_examples(#[case] input: serde_json::Value, #[case] expected: serde_json::Value) {
    assert_eq!(
        run("root.body = this.body.bloblang(this.mapping)", input).unwrap(),
        Value::from(expected)
    );
}

#[test]
fn test_literal_mapping_compiles_at_parse_time() {
    let err = parse_mapping(
        &environment::parsing_context(),
        "test",
        r#"root = this.bloblang("root = ")"#,
    )
    .unwrap_err();
    match err {
        ParseError::InvalidCall { name, source, .. } => {
            assert_eq!(name, "method bloblang");
            assert!(matches!(source, BuildError::Parse(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[rstest]
#[case("root = env(\"HOME\")", "env")]
#[case("root = file(\"/etc/hosts\")", "file")]
#[case("root = now()", "now")]
#[case("root = content()", "content")]
#[case("root = meta(\"key\")", "meta")]
#[case("root = json(\"a\")", "json")]
#[case("root = batch_index()", "batch_index")]
fn test_sandbox_rejects_privileged_functions(#[case] inner: &str, #[case] function: &str) {
    let literal = format!("root = this.bloblang({})", serde_json::to_string(inner).unwrap());
    let err = parse_mapping(&environment::parsing_context(), "test", &literal).unwrap_err();
    assert!(
        err.to_string()
            .contains(&format!("unrecognised function '{function}'")),
        "{err}"
    );

    let err = run("root = this.bloblang(this.m)", json!({"m": inner})).unwrap_err();
    assert!(
        err.to_string()
            .contains(&format!("unrecognised function '{function}'")),
        "{err}"
    );
}

#[test]
fn test_sandbox_allows_pure_functions_and_every_method() {
    assert_eq!(
        run(
            "root = this.bloblang(this.m)",
            json!({"m": "root = range(0, 3).sum().string().uppercase()"})
        )
        .unwrap(),
        Value::from("3")
    );

    let sandbox = sandbox_context();
    let all = environment::parsing_context();
    assert_eq!(
        sandbox.methods().names().collect::<Vec<_>>(),
        all.methods().names().collect::<Vec<_>>()
    );
    assert!(sandbox.functions().len() < all.functions().len());
}

#[test]
fn test_nested_mapping_is_isolated() {
    let outer = "let secret = \"hidden\"\nroot = this.bloblang(this.m)";
    let err = run(outer, json!({"m": "root = $secret"})).unwrap_err();
    assert!(err.to_string().contains("variable 'secret' undefined"), "{err}");
}

#[test]
fn test_nested_mapping_cannot_see_message() {
    let mapping = compile("root = this.bloblang(\"root = this\")");
    let batch = Arc::new(MessageBatch::new(vec![
        Part::new(r#"{"a":1}"#).with_metadata("k", "v"),
    ]));
    let part = mapping.map_part(0, &batch).unwrap().unwrap();
    assert_eq!(part.content(), br#"{"a":1}"#);
    assert_eq!(part.metadata("k"), Some("v"));
}

#[test]
fn test_nested_failures_are_wrapped() {
    let err = run(
        "root = this.bloblang(this.m)",
        json!({"m": "root = throw(\"nested boom\")"}),
    )
    .unwrap_err();
    match err {
        EvaluationError::Assignment { source, .. } => match *source {
            EvaluationError::NestedMapping(inner) => {
                assert!(inner.to_string().contains("nested boom"))
            }
            other => panic!("expected nested mapping error, got {other}"),
        },
        other => panic!("expected assignment error, got {other}"),
    }
}

#[test]
fn test_dynamic_parse_failure_is_runtime_error() {
    let err = run("root = this.bloblang(this.m)", json!({"m": "root ="})).unwrap_err();
    match err {
        EvaluationError::Assignment { source, .. } => {
            assert!(matches!(*source, EvaluationError::Build { .. }))
        }
        other => panic!("expected assignment error, got {other}"),
    }
}

#[test]
fn test_non_string_mapping_argument() {
    let err = run("root = this.bloblang(this.m)", json!({"m": 5})).unwrap_err();
    assert!(err.to_string().contains("mapping"), "{err}");
}

#[test]
fn test_nested_named_maps() {
    let inner = "map shout { root = this.uppercase() }\nroot.v = this.s.apply(\"shout\")";
    assert_eq!(
        run("root = this.bloblang(this.m)", json!({"m": inner, "s": "hey"})).unwrap(),
        Value::from(json!({"v": "HEY"}))
    );
}

#[test]
fn test_concurrent_evaluation_is_deterministic() {
    let mapping = Arc::new(compile("root = this.body.bloblang(this.mapping)"));
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let mapping = Arc::clone(&mapping);
            thread::spawn(move || {
                let input = Value::from(json!({
                    "body": {"n": i},
                    "mapping": "root.double = this.n * 2",
                }));
                (0..50)
                    .map(|_| mapping.exec_value(input.clone()).unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let results = handle.join().unwrap();
        let expected = Value::from(json!({"double": i * 2}));
        assert!(results.iter().all(|r| r == &expected));
    }
}

#[test]
fn test_registered_message_reader_sees_no_batch_when_nested() {
    // registered with default flags, so the sandbox keeps it
    environment::register_function(FunctionEntry::new(
        FunctionSpec::new("message_size", Category::Message, "Length of the message content."),
        |_| {
            Ok(ClosureFunction::arc(
                "function message_size",
                |ctx| Ok(Value::Int(ctx.message()?.content().len() as i64)),
                Vec::new(),
            ))
        },
    ))
    .unwrap();

    let batch = Arc::new(MessageBatch::new(vec![Part::new(r#"{"a":1}"#)]));

    let direct = compile("root = message_size()").map_part(0, &batch).unwrap().unwrap();
    assert_eq!(direct.content(), b"7");

    let err = compile("root = this.bloblang(\"root = message_size()\")")
        .map_part(0, &batch)
        .unwrap_err();
    match err {
        EvaluationError::Assignment { source, .. } => match *source {
            EvaluationError::NestedMapping(inner) => {
                let text = inner.to_string();
                assert!(text.contains("out of bounds for batch of size 0"), "{text}");
            }
            other => panic!("expected nested mapping error, got {other}"),
        },
        other => panic!("expected assignment error, got {other}"),
    }
}

#[test]
fn test_dynamic_range_near_integer_bounds() {
    let near_max = "root = range(9223372036854775806, 9223372036854775807, 5)";
    assert_eq!(
        run("root = this.bloblang(this.m)", json!({"m": near_max})).unwrap(),
        Value::Array(vec![Value::Int(i64::MAX - 1)])
    );

    let huge = "root = range(0, 9223372036854775807)";
    let err = run("root = this.bloblang(this.m)", json!({"m": huge})).unwrap_err();
    assert!(format!("{err:?}").contains("exceeds the limit"), "{err}");
}

#[test]
fn test_self_applying_dynamic_mapping_is_bounded() {
    let err = run(
        "root = this.bloblang(this.m)",
        json!({"m": "root = this.bloblang(this.m)"}),
    )
    .unwrap_err();
    assert!(format!("{err:?}").contains("RecursionLimit"), "{err}");
}
