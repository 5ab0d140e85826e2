//! Pratt parser for query expressions
//!
//! Expressions are compiled straight into executable node trees. Function
//! and method names are resolved against the [`ParsingContext`] while
//! parsing, so a call to anything the context does not expose fails here
//! rather than at evaluation time.

use std::sync::Arc;

use super::context::ParsingContext;
use super::error::{ParseError, ParseResult};
use super::span::Spanned;
use super::tokenizer::{Token, Tokenizer, unescape};
use crate::model::{Object, Value};
use crate::query::{
    Arithmetic, ArrayLiteral, BinaryOp, BuildError, CallArg, Coalesce, DynamicArgs, FieldAccess,
    FunctionRef, IfElse, Literal, NamedMappings, Negate, Not, ObjectLiteral, VariableRef,
};

/// Deepest expression tree the parser will build. Counts nested
/// sub-expressions, chained operators and method calls, and `map` blocks.
pub const MAX_NESTING_DEPTH: usize = 128;

/// Operator precedence levels (higher = tighter binding)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    /// Coalescing (`|`)
    Coalesce = 1,
    /// Logical OR (`||`)
    Or = 2,
    /// Logical AND (`&&`)
    And = 3,
    /// Equality (`==`, `!=`)
    Equality = 4,
    /// Comparison (`<`, `<=`, `>`, `>=`)
    Comparison = 5,
    /// Additive (`+`, `-`)
    Additive = 6,
    /// Multiplicative (`*`, `/`, `%`)
    Multiplicative = 7,
    /// Unary (`!`, `-`)
    Unary = 8,
}

impl Precedence {
    /// The next higher precedence level, used for left associativity
    #[inline(always)]
    pub const fn next_level(self) -> Self {
        match self {
            Precedence::Coalesce => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Additive,
            Precedence::Additive => Precedence::Multiplicative,
            Precedence::Multiplicative => Precedence::Unary,
            Precedence::Unary => Precedence::Unary,
        }
    }
}

#[inline(always)]
fn get_precedence(token: &Token<'_>) -> Option<Precedence> {
    match token {
        Token::Pipe => Some(Precedence::Coalesce),
        Token::OrOr => Some(Precedence::Or),
        Token::AndAnd => Some(Precedence::And),
        Token::EqualEqual | Token::NotEqual => Some(Precedence::Equality),
        Token::LessThan
        | Token::LessThanOrEqual
        | Token::GreaterThan
        | Token::GreaterThanOrEqual => Some(Precedence::Comparison),
        Token::Plus | Token::Minus => Some(Precedence::Additive),
        Token::Star | Token::Slash | Token::Percent => Some(Precedence::Multiplicative),
        _ => None,
    }
}

#[inline(always)]
fn token_to_binary_op(token: &Token<'_>) -> Option<BinaryOp> {
    match token {
        Token::EqualEqual => Some(BinaryOp::Eq),
        Token::NotEqual => Some(BinaryOp::NotEq),
        Token::Plus => Some(BinaryOp::Add),
        Token::Minus => Some(BinaryOp::Sub),
        Token::Star => Some(BinaryOp::Mul),
        Token::Slash => Some(BinaryOp::Div),
        Token::Percent => Some(BinaryOp::Mod),
        Token::LessThan => Some(BinaryOp::Lt),
        Token::LessThanOrEqual => Some(BinaryOp::LtEq),
        Token::GreaterThan => Some(BinaryOp::Gt),
        Token::GreaterThanOrEqual => Some(BinaryOp::GtEq),
        Token::AndAnd => Some(BinaryOp::And),
        Token::OrOr => Some(BinaryOp::Or),
        _ => None,
    }
}

/// A parsed operand whose field path may still be extended by postfix
/// `.field` segments before it becomes a node
enum Operand {
    Path {
        target: Option<FunctionRef>,
        path: Vec<String>,
    },
    Node(FunctionRef),
}

impl Operand {
    fn into_node(self) -> FunctionRef {
        match self {
            Operand::Path { target: None, path } => Arc::new(FieldAccess::this(path)),
            Operand::Path {
                target: Some(target),
                path,
            } if path.is_empty() => target,
            Operand::Path {
                target: Some(target),
                path,
            } => Arc::new(FieldAccess::of(target, path)),
            Operand::Node(node) => node,
        }
    }

    fn push(self, segment: String) -> Self {
        match self {
            Operand::Path { target, mut path } => {
                path.push(segment);
                Operand::Path { target, path }
            }
            Operand::Node(node) => Operand::Path {
                target: Some(node),
                path: vec![segment],
            },
        }
    }
}

/// Parser state shared by expression and statement parsing
pub struct PrattParser<'input, 'ctx> {
    pub(super) source: &'input str,
    tokenizer: Tokenizer<'input>,
    current_token: Option<Spanned<Token<'input>>>,
    pub(super) ctx: &'ctx ParsingContext,
    /// Named mappings declared by `map` statements so far
    pub(super) declared_maps: NamedMappings,
    depth: usize,
}

impl<'input, 'ctx> PrattParser<'input, 'ctx> {
    /// Create a parser positioned at the first token
    pub fn new(source: &'input str, ctx: &'ctx ParsingContext) -> ParseResult<Self> {
        let mut tokenizer = Tokenizer::new(source);
        let current_token = tokenizer.next_token()?;
        Ok(Self {
            source,
            tokenizer,
            current_token,
            ctx,
            declared_maps: NamedMappings::default(),
            depth: 0,
        })
    }

    #[inline(always)]
    pub(super) fn advance(&mut self) -> ParseResult<()> {
        self.current_token = self.tokenizer.next_token()?;
        Ok(())
    }

    #[inline(always)]
    pub(super) fn current(&self) -> Option<&Token<'input>> {
        self.current_token.as_ref().map(|t| &t.value)
    }

    /// Start of the current token, or the end of input
    pub(super) fn position(&self) -> usize {
        self.current_token
            .as_ref()
            .map(|t| t.start)
            .unwrap_or(self.source.len())
    }

    /// The token after the current one, without consuming anything
    pub(super) fn peek_next(&self) -> ParseResult<Option<Token<'input>>> {
        Ok(self.tokenizer.clone().next_token()?.map(|t| t.value))
    }

    /// Scan ahead over the remaining tokens without consuming them
    pub(super) fn lookahead(&self) -> impl Iterator<Item = Token<'input>> + use<'input> {
        let mut tokenizer = self.tokenizer.clone();
        self.current()
            .cloned()
            .into_iter()
            .chain(std::iter::from_fn(move || {
                tokenizer.next_token().ok().flatten().map(|t| t.value)
            }))
    }

    pub(super) fn is_at_end(&self) -> bool {
        self.current_token.is_none()
    }

    pub(super) fn unexpected(&self, expected: &str) -> ParseError {
        match &self.current_token {
            Some(token) => ParseError::UnexpectedToken {
                token: token.value.describe(),
                expected: expected.to_string(),
                position: token.start,
            },
            None => ParseError::UnexpectedEof {
                expected: expected.to_string(),
                position: self.source.len(),
            },
        }
    }

    pub(super) fn expect(&mut self, expected: Token<'input>) -> ParseResult<()> {
        match self.current() {
            Some(token) if std::mem::discriminant(token) == std::mem::discriminant(&expected) => {
                self.advance()
            }
            _ => Err(self.unexpected(&format!("'{}'", expected.describe()))),
        }
    }

    /// Count one more level of nesting
    fn descend(&mut self) -> ParseResult<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(ParseError::TooDeep {
                limit: MAX_NESTING_DEPTH,
                position: self.position(),
            });
        }
        Ok(())
    }

    /// Run `parse` one level deeper, restoring the depth afterwards
    pub(super) fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> ParseResult<T>,
    ) -> ParseResult<T> {
        let depth = self.depth;
        let result = self.descend().and_then(|()| parse(self));
        self.depth = depth;
        result
    }

    /// Parse a full expression
    pub fn parse_expression(&mut self) -> ParseResult<FunctionRef> {
        self.parse_expression_with_precedence(Precedence::Coalesce)
    }

    fn parse_expression_with_precedence(
        &mut self,
        min_precedence: Precedence,
    ) -> ParseResult<FunctionRef> {
        self.nested(|parser| parser.parse_binary(min_precedence))
    }

    fn parse_binary(&mut self, min_precedence: Precedence) -> ParseResult<FunctionRef> {
        let mut left = self.parse_unary()?;

        while let Some(current_token) = self.current() {
            let precedence = match get_precedence(current_token) {
                Some(prec) if prec >= min_precedence => prec,
                _ => break,
            };
            let op = token_to_binary_op(current_token);
            self.descend()?;
            self.advance()?;
            let right = self.parse_expression_with_precedence(precedence.next_level())?;
            left = match op {
                Some(op) => Arc::new(Arithmetic::new(op, left, right)),
                None => Arc::new(Coalesce::new(left, right)),
            };
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> ParseResult<FunctionRef> {
        match self.current() {
            Some(Token::Bang) => {
                self.advance()?;
                let operand = self.parse_expression_with_precedence(Precedence::Unary)?;
                Ok(Arc::new(Not::new(operand)))
            }
            Some(Token::Minus) => {
                self.advance()?;
                let operand = self.parse_expression_with_precedence(Precedence::Unary)?;
                // Fold negative literals so they still bind as constants
                Ok(match operand.as_literal() {
                    Some(Value::Int(i)) => match i.checked_neg() {
                        Some(n) => Literal::arc(Value::Int(n)),
                        None => Arc::new(Negate::new(operand)),
                    },
                    Some(Value::Float(f)) => Literal::arc(Value::Float(-f)),
                    _ => Arc::new(Negate::new(operand)),
                })
            }
            _ => {
                let operand = self.parse_primary()?;
                Ok(self.parse_postfix(operand)?.into_node())
            }
        }
    }

    fn parse_primary(&mut self) -> ParseResult<Operand> {
        let Some(token) = self.current_token.clone() else {
            return Err(self.unexpected("a query"));
        };
        let position = token.start;

        match token.value {
            Token::Integer(i) => {
                self.advance()?;
                Ok(Operand::Node(Literal::arc(Value::Int(i))))
            }
            Token::Float(f) => {
                self.advance()?;
                Ok(Operand::Node(Literal::arc(Value::Float(f))))
            }
            Token::String(raw) => {
                self.advance()?;
                Ok(Operand::Node(Literal::arc(Value::String(unescape(
                    raw, position,
                )?))))
            }
            Token::RawString(raw) => {
                self.advance()?;
                Ok(Operand::Node(Literal::arc(Value::from(raw))))
            }
            Token::True | Token::False => {
                self.advance()?;
                Ok(Operand::Node(Literal::arc(Value::Bool(
                    token.value == Token::True,
                ))))
            }
            Token::Null => {
                self.advance()?;
                Ok(Operand::Node(Literal::arc(Value::Null)))
            }
            Token::This => {
                self.advance()?;
                Ok(Operand::Path {
                    target: None,
                    path: Vec::new(),
                })
            }
            Token::Identifier(name) => {
                self.advance()?;
                if let Some(Token::LeftParen) = self.current() {
                    let args = self.parse_call_args()?;
                    Ok(Operand::Node(self.compile_function(name, args, position)?))
                } else {
                    Ok(Operand::Path {
                        target: None,
                        path: vec![name.to_string()],
                    })
                }
            }
            Token::Dollar => {
                self.advance()?;
                match self.current() {
                    Some(Token::Identifier(name)) => {
                        let name = name.to_string();
                        self.advance()?;
                        Ok(Operand::Node(Arc::new(VariableRef::new(name))))
                    }
                    _ => Err(self.unexpected("variable name")),
                }
            }
            Token::LeftParen => {
                self.advance()?;
                let expr = self.parse_expression()?;
                self.expect(Token::RightParen)?;
                Ok(Operand::Node(expr))
            }
            Token::LeftBracket => self.parse_array().map(Operand::Node),
            Token::LeftBrace => self.parse_object().map(Operand::Node),
            Token::If => self.parse_if().map(Operand::Node),
            _ => Err(self.unexpected("a query")),
        }
    }

    fn parse_postfix(&mut self, mut operand: Operand) -> ParseResult<Operand> {
        while let Some(Token::Dot) = self.current() {
            self.advance()?;
            let position = self.position();
            operand = match self.current().cloned() {
                Some(Token::Identifier(name)) => {
                    self.advance()?;
                    if let Some(Token::LeftParen) = self.current() {
                        self.descend()?;
                        let args = self.parse_call_args()?;
                        let target = operand.into_node();
                        Operand::Node(self.compile_method(name, target, args, position)?)
                    } else {
                        operand.push(name.to_string())
                    }
                }
                Some(Token::String(raw)) => {
                    self.advance()?;
                    operand.push(unescape(raw, position)?)
                }
                Some(Token::Integer(i)) if i >= 0 => {
                    self.advance()?;
                    operand.push(i.to_string())
                }
                _ => return Err(self.unexpected("field path or method")),
            };
        }
        Ok(operand)
    }

    fn parse_call_args(&mut self) -> ParseResult<Vec<CallArg>> {
        self.expect(Token::LeftParen)?;
        let mut args = Vec::new();
        while !matches!(self.current(), Some(Token::RightParen)) {
            let named = match self.current() {
                Some(Token::Identifier(name)) if self.peek_next()? == Some(Token::Colon) => {
                    Some(name.to_string())
                }
                _ => None,
            };
            if named.is_some() {
                self.advance()?;
                self.advance()?;
            }
            let value = self.parse_expression()?;
            args.push(CallArg { name: named, value });

            match self.current() {
                Some(Token::Comma) => self.advance()?,
                Some(Token::RightParen) => {}
                _ => return Err(self.unexpected("',' or ')'")),
            }
        }
        self.advance()?;
        Ok(args)
    }

    fn parse_array(&mut self) -> ParseResult<FunctionRef> {
        self.expect(Token::LeftBracket)?;
        let mut items = Vec::new();
        while !matches!(self.current(), Some(Token::RightBracket)) {
            items.push(self.parse_expression()?);
            match self.current() {
                Some(Token::Comma) => self.advance()?,
                Some(Token::RightBracket) => {}
                _ => return Err(self.unexpected("',' or ']'")),
            }
        }
        self.advance()?;

        let literals: Option<Vec<Value>> = items.iter().map(|i| i.as_literal().cloned()).collect();
        Ok(match literals {
            Some(values) if !values.iter().any(|v| matches!(v, Value::Nothing)) => {
                Literal::arc(Value::Array(values))
            }
            _ => Arc::new(ArrayLiteral::new(items)),
        })
    }

    fn parse_object(&mut self) -> ParseResult<FunctionRef> {
        self.expect(Token::LeftBrace)?;
        let mut entries = Vec::new();
        while !matches!(self.current(), Some(Token::RightBrace)) {
            let position = self.position();
            let key = match self.current() {
                Some(Token::String(raw)) => unescape(raw, position)?,
                Some(Token::RawString(raw)) => raw.to_string(),
                _ => return Err(self.unexpected("quoted object key")),
            };
            self.advance()?;
            self.expect(Token::Colon)?;
            entries.push((key, self.parse_expression()?));
            match self.current() {
                Some(Token::Comma) => self.advance()?,
                Some(Token::RightBrace) => {}
                _ => return Err(self.unexpected("',' or '}'")),
            }
        }
        self.advance()?;

        let literal: Option<Object> = entries
            .iter()
            .map(|(k, v)| v.as_literal().map(|v| (k.clone(), v.clone())))
            .collect();
        Ok(match literal {
            Some(object) if !object.values().any(|v| matches!(v, Value::Nothing)) => {
                Literal::arc(Value::Object(object))
            }
            _ => Arc::new(ObjectLiteral::new(entries)),
        })
    }

    fn parse_block(&mut self) -> ParseResult<FunctionRef> {
        self.expect(Token::LeftBrace)?;
        let body = self.parse_expression()?;
        self.expect(Token::RightBrace)?;
        Ok(body)
    }

    fn parse_if(&mut self) -> ParseResult<FunctionRef> {
        let mut branches = Vec::new();
        let mut otherwise = None;

        self.expect(Token::If)?;
        let condition = self.parse_expression()?;
        branches.push((condition, self.parse_block()?));

        while let Some(Token::Else) = self.current() {
            self.advance()?;
            if let Some(Token::If) = self.current() {
                self.advance()?;
                let condition = self.parse_expression()?;
                branches.push((condition, self.parse_block()?));
            } else {
                otherwise = Some(self.parse_block()?);
                break;
            }
        }

        Ok(Arc::new(IfElse::new(branches, otherwise)))
    }

    fn compile_function(
        &self,
        name: &str,
        args: Vec<CallArg>,
        position: usize,
    ) -> ParseResult<FunctionRef> {
        let entry = self
            .ctx
            .functions()
            .lookup(name)
            .ok_or_else(|| ParseError::UnknownFunction {
                name: name.to_string(),
                position,
            })?;
        let annotation = format!("function {name}");
        let invalid = |source: BuildError| ParseError::InvalidCall {
            name: annotation.clone(),
            source,
            position,
        };

        let params = entry.spec.params.bind(args).map_err(|e| invalid(e.into()))?;
        if params.is_dynamic() {
            let ctor = Arc::clone(&entry.ctor);
            return Ok(Arc::new(DynamicArgs::new(
                annotation.clone(),
                params,
                Vec::new(),
                move |p| ctor(p),
            )));
        }
        (entry.ctor)(&params).map_err(invalid)
    }

    fn compile_method(
        &self,
        name: &str,
        target: FunctionRef,
        args: Vec<CallArg>,
        position: usize,
    ) -> ParseResult<FunctionRef> {
        let entry = self
            .ctx
            .methods()
            .lookup(name)
            .ok_or_else(|| ParseError::UnknownMethod {
                name: name.to_string(),
                position,
            })?;
        let annotation = format!("method {name}");
        let invalid = |source: BuildError| ParseError::InvalidCall {
            name: annotation.clone(),
            source,
            position,
        };

        let params = entry.spec.params.bind(args).map_err(|e| invalid(e.into()))?;
        if params.is_dynamic() {
            let ctor = Arc::clone(&entry.ctor);
            let targets = target.query_targets();
            return Ok(Arc::new(DynamicArgs::new(
                annotation.clone(),
                params,
                targets,
                move |p| ctor(Arc::clone(&target), p),
            )));
        }
        (entry.ctor)(target, &params).map_err(invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Environment;
    use crate::query::EvaluationContext;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    fn eval(query: &str, input: serde_json::Value) -> Value {
        let ctx = Environment::standard().parsing_context();
        let mut parser = PrattParser::new(query, &ctx).unwrap();
        let node = parser.parse_expression().unwrap();
        assert!(parser.is_at_end(), "trailing input in {query}");
        node.exec(&EvaluationContext::new(Value::from(input)))
            .unwrap()
    }

    fn parse_err(query: &str) -> ParseError {
        let ctx = Environment::standard().parsing_context();
        let mut parser = PrattParser::new(query, &ctx).unwrap();
        match parser.parse_expression() {
            Ok(_) => panic!("expected {query} to fail"),
            Err(e) => e,
        }
    }

    #[test]
    fn test_precedence() {
        assert_eq!(eval("1 + 2 * 3", json!(null)), Value::Int(7));
        assert_eq!(eval("(1 + 2) * 3", json!(null)), Value::Int(9));
        assert_eq!(eval("10 - 4 - 3", json!(null)), Value::Int(3));
        assert_eq!(eval("1 < 2 && 3 > 4 || true", json!(null)), Value::Bool(true));
        assert_eq!(eval("-2 * 3", json!(null)), Value::Int(-6));
        assert_eq!(eval("!false && true", json!(null)), Value::Bool(true));
    }

    #[test]
    fn test_paths_and_methods() {
        let input = json!({"user": {"name": "ada", "tags": ["a", "b"]}});
        assert_eq!(eval("this.user.name", input.clone()), Value::from("ada"));
        assert_eq!(eval("user.name.uppercase()", input.clone()), Value::from("ADA"));
        assert_eq!(eval("this.user.tags.1", input.clone()), Value::from("b"));
        assert_eq!(
            eval("this.user.tags.join(\",\").uppercase()", input.clone()),
            Value::from("A,B")
        );
        assert_eq!(eval("this.missing", input), Value::Null);
    }

    #[test]
    fn test_literals() {
        assert_eq!(
            eval(r#"{"a": [1, "two", null], "b": this.x}"#, json!({"x": true})),
            Value::from(json!({"a": [1, "two", null], "b": true}))
        );
        assert_eq!(eval(r#""tab\there""#, json!(null)), Value::from("tab\there"));
    }

    #[test]
    fn test_coalesce_and_if() {
        assert_eq!(eval("this.a | this.b", json!({"b": 2})), Value::Int(2));
        assert_eq!(
            eval(
                "if this.n > 5 { \"big\" } else if this.n > 2 { \"mid\" } else { \"small\" }",
                json!({"n": 3})
            ),
            Value::from("mid")
        );
    }

    #[test]
    fn test_named_arguments() {
        assert_eq!(
            eval(r#"this.s.replace(new: "b", old: "a")"#, json!({"s": "aa"})),
            Value::from("bb")
        );
        assert_eq!(
            eval("range(start: 0, stop: 3)", json!(null)),
            Value::from(json!([0, 1, 2]))
        );
    }

    #[test]
    fn test_dynamic_arguments() {
        assert_eq!(
            eval("this.s.has_prefix(this.p)", json!({"s": "foobar", "p": "foo"})),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_unknown_identifiers() {
        assert_eq!(
            parse_err("nope()"),
            ParseError::UnknownFunction {
                name: "nope".into(),
                position: 0
            }
        );
        assert_eq!(
            parse_err("this.foo.nope()"),
            ParseError::UnknownMethod {
                name: "nope".into(),
                position: 9
            }
        );
    }

    #[test]
    fn test_invalid_call_at_parse_time() {
        assert!(matches!(
            parse_err("this.foo.replace(\"a\")"),
            ParseError::InvalidCall { .. }
        ));
        assert!(matches!(
            parse_err("this.foo.re_match(\"(\")"),
            ParseError::InvalidCall { .. }
        ));
    }

    #[rstest]
    #[case::parens(format!("{}1{}", "(".repeat(20_000), ")".repeat(20_000)))]
    #[case::arrays(format!("{}1{}", "[".repeat(20_000), "]".repeat(20_000)))]
    #[case::negation("!".repeat(20_000) + "true")]
    #[case::chained_operators(vec!["1"; 20_000].join(" + "))]
    #[case::chained_methods(format!("this{}", ".string()".repeat(20_000)))]
    fn test_deep_nesting_is_rejected(#[case] query: String) {
        assert!(matches!(
            parse_err(&query),
            ParseError::TooDeep {
                limit: MAX_NESTING_DEPTH,
                ..
            }
        ));
    }

    #[test]
    fn test_nesting_below_limit() {
        let query = format!("{}1{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(eval(&query, json!(null)), Value::Int(1));
        let sum = vec!["1"; 100].join(" + ");
        assert_eq!(eval(&sum, json!(null)), Value::Int(100));
    }
}
