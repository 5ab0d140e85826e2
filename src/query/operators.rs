//! Operator nodes
//!
//! Binary arithmetic, comparison and boolean operators, unary `!` and `-`,
//! and the `|` coalescing operator.

use std::cmp::Ordering;
use std::fmt;

use super::context::EvaluationContext;
use super::error::{EvaluationError, EvaluationResult};
use super::function::{Function, FunctionRef, TargetPath};
use crate::model::Value;

/// Binary operators in the query language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Mod,
    /// `==`
    Eq,
    /// `!=`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
    /// `&&`
    And,
    /// `||`
    Or,
}

impl BinaryOp {
    /// Operator symbol
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Binary operator node
#[derive(Debug)]
pub struct Arithmetic {
    op: BinaryOp,
    left: FunctionRef,
    right: FunctionRef,
}

impl Arithmetic {
    /// Create a binary operator node
    pub fn new(op: BinaryOp, left: FunctionRef, right: FunctionRef) -> Self {
        Self { op, left, right }
    }
}

impl Function for Arithmetic {
    fn exec(&self, ctx: &EvaluationContext) -> EvaluationResult<Value> {
        match self.op {
            BinaryOp::And => {
                if !expect_bool(self.op, self.left.exec(ctx)?)? {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(expect_bool(self.op, self.right.exec(ctx)?)?))
            }
            BinaryOp::Or => {
                if expect_bool(self.op, self.left.exec(ctx)?)? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(expect_bool(self.op, self.right.exec(ctx)?)?))
            }
            op => {
                let left = self.left.exec(ctx)?;
                let right = self.right.exec(ctx)?;
                apply(op, &left, &right)
            }
        }
    }

    fn query_targets(&self) -> Vec<TargetPath> {
        let mut targets = self.left.query_targets();
        targets.extend(self.right.query_targets());
        targets
    }
}

fn expect_bool(op: BinaryOp, value: Value) -> EvaluationResult<bool> {
    match value {
        Value::Bool(b) => Ok(b),
        other => Err(EvaluationError::type_mismatch(op.symbol(), "bool", &other)),
    }
}

/// Apply a non short-circuiting binary operator to two values
pub fn apply(op: BinaryOp, left: &Value, right: &Value) -> EvaluationResult<Value> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(values_equal(left, right))),
        BinaryOp::NotEq => Ok(Value::Bool(!values_equal(left, right))),
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            let ordering = compare(op, left, right)?;
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::LtEq => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        BinaryOp::Add => match (left, right) {
            (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
            _ => numeric(op, left, right),
        },
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            numeric(op, left, right)
        }
        BinaryOp::And | BinaryOp::Or => {
            let l = expect_bool(op, left.clone())?;
            let r = expect_bool(op, right.clone())?;
            Ok(Value::Bool(if op == BinaryOp::And { l && r } else { l || r }))
        }
    }
}

fn numeric(op: BinaryOp, left: &Value, right: &Value) -> EvaluationResult<Value> {
    if let (Value::Int(a), Value::Int(b)) = (left, right) {
        let (a, b) = (*a, *b);
        let result = match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Sub => a.checked_sub(b),
            BinaryOp::Mul => a.checked_mul(b),
            BinaryOp::Mod => {
                if b == 0 {
                    return Err(EvaluationError::DivideByZero);
                }
                a.checked_rem(b)
            }
            // Division always yields a float
            _ => None,
        };
        if let Some(i) = result {
            return Ok(Value::Int(i));
        }
    }

    let a = left
        .as_f64()
        .ok_or_else(|| EvaluationError::type_mismatch(op.symbol(), "number", left))?;
    let b = right
        .as_f64()
        .ok_or_else(|| EvaluationError::type_mismatch(op.symbol(), "number", right))?;
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => {
            if b == 0.0 {
                return Err(EvaluationError::DivideByZero);
            }
            a / b
        }
        _ => {
            if b == 0.0 {
                return Err(EvaluationError::DivideByZero);
            }
            a % b
        }
    };
    Ok(Value::Float(result))
}

/// Deep equality where integers and floats compare numerically
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            left.as_f64() == right.as_f64()
        }
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, v)| b.get(k).is_some_and(|other| values_equal(v, other)))
        }
        (Value::String(s), Value::Bytes(b)) | (Value::Bytes(b), Value::String(s)) => {
            s.as_bytes() == b.as_slice()
        }
        _ => left == right,
    }
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> EvaluationResult<Ordering> {
    match (left, right) {
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        _ => {
            let a = left
                .as_f64()
                .ok_or_else(|| EvaluationError::type_mismatch(op.symbol(), "number", left))?;
            let b = right
                .as_f64()
                .ok_or_else(|| EvaluationError::type_mismatch(op.symbol(), "number", right))?;
            a.partial_cmp(&b).ok_or_else(|| {
                EvaluationError::function(op.symbol(), "cannot compare NaN values")
            })
        }
    }
}

/// `!q`
#[derive(Debug)]
pub struct Not {
    operand: FunctionRef,
}

impl Not {
    /// Create a negation node
    pub fn new(operand: FunctionRef) -> Self {
        Self { operand }
    }
}

impl Function for Not {
    fn exec(&self, ctx: &EvaluationContext) -> EvaluationResult<Value> {
        match self.operand.exec(ctx)? {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            other => Err(EvaluationError::type_mismatch("!", "bool", &other)),
        }
    }

    fn query_targets(&self) -> Vec<TargetPath> {
        self.operand.query_targets()
    }
}

/// `-q`
#[derive(Debug)]
pub struct Negate {
    operand: FunctionRef,
}

impl Negate {
    /// Create a numeric negation node
    pub fn new(operand: FunctionRef) -> Self {
        Self { operand }
    }
}

impl Function for Negate {
    fn exec(&self, ctx: &EvaluationContext) -> EvaluationResult<Value> {
        match self.operand.exec(ctx)? {
            Value::Int(i) => Ok(i
                .checked_neg()
                .map(Value::Int)
                .unwrap_or(Value::Float(-(i as f64)))),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(EvaluationError::type_mismatch("-", "number", &other)),
        }
    }

    fn query_targets(&self) -> Vec<TargetPath> {
        self.operand.query_targets()
    }
}

/// `a | b`: `b` when `a` fails or yields null
#[derive(Debug)]
pub struct Coalesce {
    left: FunctionRef,
    right: FunctionRef,
}

impl Coalesce {
    /// Create a coalescing node
    pub fn new(left: FunctionRef, right: FunctionRef) -> Self {
        Self { left, right }
    }
}

impl Function for Coalesce {
    fn exec(&self, ctx: &EvaluationContext) -> EvaluationResult<Value> {
        match self.left.exec(ctx) {
            Ok(Value::Null) | Err(_) => self.right.exec(ctx),
            Ok(v) => Ok(v),
        }
    }

    fn query_targets(&self) -> Vec<TargetPath> {
        let mut targets = self.left.query_targets();
        targets.extend(self.right.query_targets());
        targets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::function::Literal;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    fn run(op: BinaryOp, left: Value, right: Value) -> EvaluationResult<Value> {
        Arithmetic::new(op, Literal::arc(left), Literal::arc(right))
            .exec(&EvaluationContext::new(Value::Null))
    }

    #[test]
    fn test_integer_arithmetic_stays_integer() {
        assert_eq!(run(BinaryOp::Add, 2.into(), 3.into()).unwrap(), Value::Int(5));
        assert_eq!(run(BinaryOp::Mul, 2.into(), 3.into()).unwrap(), Value::Int(6));
        assert_eq!(run(BinaryOp::Mod, 7.into(), 3.into()).unwrap(), Value::Int(1));
        assert_eq!(
            run(BinaryOp::Div, 6.into(), 4.into()).unwrap(),
            Value::Float(1.5)
        );
        assert_eq!(
            run(BinaryOp::Add, 1.into(), 0.5.into()).unwrap(),
            Value::Float(1.5)
        );
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(
            run(BinaryOp::Div, 1.into(), 0.into()).unwrap_err(),
            EvaluationError::DivideByZero
        );
        assert_eq!(
            run(BinaryOp::Mod, 1.into(), 0.into()).unwrap_err(),
            EvaluationError::DivideByZero
        );
    }

    #[test]
    fn test_string_concatenation_and_comparison() {
        assert_eq!(
            run(BinaryOp::Add, "foo".into(), "bar".into()).unwrap(),
            Value::from("foobar")
        );
        assert_eq!(
            run(BinaryOp::Lt, "a".into(), "b".into()).unwrap(),
            Value::Bool(true)
        );
        assert!(run(BinaryOp::Lt, "a".into(), 1.into()).is_err());
    }

    #[test]
    fn test_equality_is_deep_and_numeric() {
        assert_eq!(
            run(BinaryOp::Eq, 1.into(), 1.0.into()).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            run(
                BinaryOp::Eq,
                Value::from(json!({"a": [1, 2]})),
                Value::from(json!({"a": [1.0, 2]}))
            )
            .unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            run(BinaryOp::NotEq, "a".into(), Value::Null).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_boolean_short_circuit() {
        // Right side would fail the type check if evaluated
        assert_eq!(
            run(BinaryOp::And, false.into(), 1.into()).unwrap(),
            Value::Bool(false)
        );
        assert_eq!(
            run(BinaryOp::Or, true.into(), 1.into()).unwrap(),
            Value::Bool(true)
        );
        assert!(run(BinaryOp::And, true.into(), 1.into()).is_err());
    }

    #[test]
    fn test_unary_and_coalesce() {
        let ctx = EvaluationContext::new(Value::Null);
        assert_eq!(
            Not::new(Literal::arc(true.into())).exec(&ctx).unwrap(),
            Value::Bool(false)
        );
        assert_eq!(
            Negate::new(Literal::arc(5.into())).exec(&ctx).unwrap(),
            Value::Int(-5)
        );
        assert_eq!(
            Coalesce::new(Literal::arc(Value::Null), Literal::arc("b".into()))
                .exec(&ctx)
                .unwrap(),
            Value::from("b")
        );
        let failing = Arc::new(Not::new(Literal::arc(1.into())));
        assert_eq!(
            Coalesce::new(failing, Literal::arc("b".into()))
                .exec(&ctx)
                .unwrap(),
            Value::from("b")
        );
    }
}
