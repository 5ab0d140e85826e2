//! Integration tests for the mapping language and its surrounding pipeline

use bloblang::environment::{self, Environment};
use bloblang::query::{
    Capabilities, Category, ClosureFunction, FunctionEntry, FunctionSpec, MethodEntry,
    MethodSpec, Param, RegistryError,
};
use bloblang::{
    InterpolatedString, MappingProcessor, MessageBatch, Part, ProcessorConfig, Value,
    parse_mapping,
};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::json;

fn map(mapping: &str, input: serde_json::Value) -> Value {
    Environment::standard()
        .parse(mapping)
        .unwrap()
        .exec_value(Value::from(input))
        .unwrap()
}

#[rstest]
#[case("root = this.a + this.b", json!({"a": 1, "b": 2}), json!(3))]
#[case("root = this.a / this.b", json!({"a": 3, "b": 2}), json!(1.5))]
#[case("root = this.s + \"!\"", json!({"s": "hi"}), json!("hi!"))]
#[case("root = this.missing | \"default\"", json!({}), json!("default"))]
#[case("root = this.n > 3 && this.n < 10", json!({"n": 5}), json!(true))]
#[case("root = [this.a, this.b].sum()", json!({"a": 1.5, "b": 2}), json!(3.5))]
#[case("root = this.tags.join(\",\")", json!({"tags": ["a", "b"]}), json!("a,b"))]
#[case("root = if this.n == 1 { \"one\" } else { \"other\" }", json!({"n": 1.0}), json!("one"))]
fn test_expressions(
    #[case] mapping: &str,
    #[case] input: serde_json::Value,
    #[case] expected: serde_json::Value,
) {
    assert_eq!(map(mapping, input), Value::from(expected));
}

#[test]
fn test_statements_build_document() {
    let mapping = r#"
        # copy and reshape
        root = this
        root.name = this.name.uppercase()
        root.extra = deleted()
        let count = this.items.length()
        root.summary = "%v items".replace("%v", $count.string())
        root."dotted.key" = true
    "#;
    assert_eq!(
        map(mapping, json!({"name": "ada", "extra": 1, "items": [1, 2, 3]})),
        Value::from(json!({
            "name": "ADA",
            "items": [1, 2, 3],
            "summary": "3 items",
            "dotted.key": true
        }))
    );
}

#[test]
fn test_map_each_and_filter() {
    let mapping = r#"
        root.evens = this.nums.filter(this % 2 == 0)
        root.doubled = this.nums.map_each(this * 2)
        root.upper = this.obj.map_each(this.value.uppercase())
    "#;
    assert_eq!(
        map(mapping, json!({"nums": [1, 2, 3, 4], "obj": {"a": "x"}})),
        Value::from(json!({
            "evens": [2, 4],
            "doubled": [2, 4, 6, 8],
            "upper": {"a": "X"}
        }))
    );
}

#[test]
fn test_named_maps() {
    let mapping = r#"
        map person {
            root.full = this.first + " " + this.last
        }
        root.people = this.people.map_each(this.apply("person"))
    "#;
    assert_eq!(
        map(mapping, json!({"people": [{"first": "Ada", "last": "Lovelace"}]})),
        Value::from(json!({"people": [{"full": "Ada Lovelace"}]}))
    );
}

#[test]
fn test_error_recovery() {
    assert_eq!(
        map("root = this.n.number().catch(0)", json!({"n": "nope"})),
        Value::Int(0)
    );
    assert_eq!(
        map("root = this.v.or(\"fallback\")", json!({"v": null})),
        Value::from("fallback")
    );
}

#[test]
fn test_parse_errors_report_position() {
    let text = "root.a = 1\nroot.b = unknown_fn()";
    let err = Environment::standard().parse(text).unwrap_err();
    assert_eq!(
        err.describe(text),
        "line 2 char 10: unrecognised function 'unknown_fn'"
    );
}

#[test]
fn test_registry_extension() {
    let mut env = Environment::standard();
    env.register_method(MethodEntry::new(
        MethodSpec::new("shout", Category::Strings, "Uppercase with emphasis.")
            .param(Param::string("suffix", "Appended text.").default("!")),
        |target, params| {
            let suffix = params.field_string("suffix")?;
            let targets = target.query_targets();
            Ok(ClosureFunction::arc(
                "method shout",
                move |ctx| {
                    let v = target.exec(ctx)?;
                    Ok(Value::from(format!("{}{suffix}", v.to_string().to_uppercase())))
                },
                targets,
            ))
        },
    ))
    .unwrap();

    let mapping = env
        .parse("root.a = this.s.shout()\nroot.b = this.s.shout(suffix: \"?\")")
        .unwrap();
    assert_eq!(
        mapping.exec_value(Value::from(json!({"s": "hey"}))).unwrap(),
        Value::from(json!({"a": "HEY!", "b": "HEY?"}))
    );

    let duplicate = env.register_method(MethodEntry::new(
        MethodSpec::new("shout", Category::Strings, ""),
        |target, _| Ok(target),
    ));
    assert_eq!(
        duplicate,
        Err(RegistryError::Duplicate {
            kind: "method",
            name: "shout".into()
        })
    );
}

#[test]
fn test_builtin_capability_flags() {
    let env = Environment::standard();
    let flags = |name: &str| {
        let entry = env.functions().lookup(name).unwrap();
        (entry.is_pure(), Capabilities::requires_message(entry))
    };
    assert_eq!(flags("range"), (true, false));
    assert_eq!(flags("env"), (false, false));
    assert_eq!(flags("now"), (false, false));
    assert_eq!(flags("content"), (true, true));
    assert_eq!(flags("meta"), (true, true));
}

#[test]
fn test_global_function_registration() {
    environment::register_function(FunctionEntry::new(
        FunctionSpec::new("integration_answer", Category::General, "Returns 42."),
        |_| Ok(bloblang::query::Literal::arc(Value::Int(42))),
    ))
    .unwrap();

    let mapping = parse_mapping(
        &environment::parsing_context(),
        "test",
        "root = integration_answer()",
    )
    .unwrap();
    assert_eq!(mapping.exec_value(Value::Null).unwrap(), Value::Int(42));

    // pure and message-free, so nested mappings see it too
    let nested = parse_mapping(
        &environment::parsing_context(),
        "test",
        "root = this.bloblang(\"root = integration_answer()\")",
    )
    .unwrap();
    assert_eq!(nested.exec_value(Value::Null).unwrap(), Value::Int(42));
}

#[test]
fn test_processor_pipeline() {
    let config = ProcessorConfig::from_json(
        concat!(
            r#"{"mapping": "meta topic = this.kind\nroot.id = this.id + 0\n"#,
            r#"root.src = meta(\"origin\")"}"#,
        ),
    )
    .unwrap();
    let processor = MappingProcessor::new(&config).unwrap();

    let batch = MessageBatch::new(vec![
        Part::new(r#"{"id": 1, "kind": "order"}"#).with_metadata("origin", "web"),
        Part::new("not json").with_metadata("origin", "web"),
    ]);
    let out = processor.process(batch).into_parts();

    assert_eq!(out.len(), 2);
    assert_eq!(out[0].content(), br#"{"id":1,"src":"web"}"#);
    assert_eq!(out[0].metadata("topic"), Some("order"));
    assert_eq!(out[1].content(), b"not json");
    assert!(out[1].error().is_some());

    let topic = InterpolatedString::parse(
        &environment::parsing_context(),
        "${! meta(\"topic\") }-${! this.id }",
    )
    .unwrap();
    let batch = std::sync::Arc::new(MessageBatch::new(vec![out[0].clone()]));
    let ctx = bloblang::EvaluationContext::for_message(batch, 0);
    assert_eq!(topic.render(&ctx).unwrap(), "order-1");
}
