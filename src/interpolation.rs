//! Interpolated strings
//!
//! Strings such as `${! meta("topic") }-${! this.id }` are split into literal
//! text and embedded queries. Rendering evaluates each query and splices in
//! its value: strings verbatim, everything else as JSON. Writing
//! `${{! ... }}` produces the literal text `${! ... }`.

use crate::model::Value;
use crate::parser::{ParseError, ParseResult, ParsingContext, parse_query};
use crate::query::{EvaluationContext, EvaluationResult, FunctionRef, TargetPath};

const OPEN: &str = "${!";
const ESCAPED_OPEN: &str = "${{!";

#[derive(Debug, Clone)]
enum Segment {
    Text(String),
    Query(FunctionRef),
}

/// A string with embedded queries
#[derive(Debug, Clone)]
pub struct InterpolatedString {
    segments: Vec<Segment>,
}

impl InterpolatedString {
    /// Split `text` into literal and query segments, compiling each query
    pub fn parse(ctx: &ParsingContext, text: &str) -> ParseResult<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = text;

        while let Some(start) = rest.find("${") {
            let offset = text.len() - rest.len() + start;
            literal.push_str(&rest[..start]);
            let tail = &rest[start..];

            if let Some(inner) = tail.strip_prefix(ESCAPED_OPEN) {
                match inner.find("}}") {
                    Some(end) => {
                        literal.push_str(OPEN);
                        literal.push_str(&inner[..end]);
                        literal.push('}');
                        rest = &inner[end + 2..];
                    }
                    None => {
                        literal.push_str(tail);
                        rest = "";
                    }
                }
            } else if let Some(inner) = tail.strip_prefix(OPEN) {
                let end = closing_brace(inner).ok_or_else(|| ParseError::UnexpectedEof {
                    expected: "'}' closing interpolation".to_string(),
                    position: text.len(),
                })?;
                let query = parse_query(ctx, &inner[..end])
                    .map_err(|e| e.shifted(offset + OPEN.len()))?;
                if !literal.is_empty() {
                    segments.push(Segment::Text(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Query(query));
                rest = &inner[end + 1..];
            } else {
                literal.push_str("${");
                rest = &tail[2..];
            }
        }

        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Text(literal));
        }
        Ok(Self { segments })
    }

    /// Whether the string contains no queries
    pub fn is_static(&self) -> bool {
        self.segments.iter().all(|s| matches!(s, Segment::Text(_)))
    }

    /// Evaluate every query and join the segments
    pub fn render(&self, ctx: &EvaluationContext) -> EvaluationResult<String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Query(query) => match query.exec(ctx)? {
                    Value::String(s) => out.push_str(&s),
                    other => out.push_str(&other.to_string()),
                },
            }
        }
        Ok(out)
    }

    /// Inputs read by the embedded queries
    pub fn query_targets(&self) -> Vec<TargetPath> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Query(q) => Some(q.query_targets()),
                Segment::Text(_) => None,
            })
            .flatten()
            .collect()
    }
}

/// Offset of the `}` closing an interpolation, skipping nested braces and
/// quoted strings
fn closing_brace(inner: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in inner.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' if depth == 0 => return Some(i),
            '}' => depth -= 1,
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Environment;
    use crate::model::{MessageBatch, Part};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;
    use std::sync::Arc;

    fn interp(text: &str) -> InterpolatedString {
        InterpolatedString::parse(&Environment::standard().parsing_context(), text).unwrap()
    }

    #[rstest]
    #[case("plain text", "plain text")]
    #[case("id-${! this.id }", "id-7")]
    #[case("${! this.name.uppercase() }!", "ADA!")]
    #[case("${! {\"a\": this.id} }", r#"{"a":7}"#)]
    #[case("${! \"}\" + this.name }", "}ada")]
    #[case("${{! this.id }}", "${! this.id }")]
    #[case("cost: ${5}", "cost: ${5}")]
    fn test_render(#[case] text: &str, #[case] expected: &str) {
        let ctx = EvaluationContext::new(Value::from(json!({"id": 7, "name": "ada"})));
        assert_eq!(interp(text).render(&ctx).unwrap(), expected);
    }

    #[test]
    fn test_is_static() {
        assert!(interp("no queries").is_static());
        assert!(interp("${{! escaped }}").is_static());
        assert!(!interp("${! this }").is_static());
    }

    #[test]
    fn test_message_functions() {
        let batch = Arc::new(MessageBatch::new(vec![
            Part::new("{}").with_metadata("topic", "orders"),
        ]));
        let ctx = EvaluationContext::for_message(batch, 0);
        assert_eq!(
            interp("${! meta(\"topic\") }-${! batch_index() }")
                .render(&ctx)
                .unwrap(),
            "orders-0"
        );
    }

    #[test]
    fn test_targets() {
        let targets = interp("${! this.a }/${! $b }").query_targets();
        assert_eq!(targets.len(), 2);
    }

    #[test]
    fn test_errors() {
        let ctx = Environment::standard().parsing_context();
        assert!(matches!(
            InterpolatedString::parse(&ctx, "${! this.a "),
            Err(ParseError::UnexpectedEof { .. })
        ));
        let err = InterpolatedString::parse(&ctx, "ab${! nope() }").unwrap_err();
        assert_eq!(
            err,
            ParseError::UnknownFunction {
                name: "nope".into(),
                position: 6
            }
        );
    }
}
