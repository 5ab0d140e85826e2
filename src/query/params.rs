//! Parameter schemas and argument binding for functions and methods
//!
//! A [`Params`] schema declares the named, typed parameters a function or
//! method accepts. Binding the arguments of a call site against the schema
//! yields [`ParsedParams`], from which constructors extract typed values.
//!
//! Arguments may be given positionally in schema order, by name
//! (`name: value`), or a mix of both as long as no parameter is supplied
//! twice. Literal arguments are checked at bind time. Any other argument
//! makes the binding dynamic: it is resolved against each evaluation
//! context before the constructor runs.

use std::fmt;

use super::context::EvaluationContext;
use super::error::{EvaluationError, EvaluationResult, ParamError};
use super::function::{FunctionRef, TargetPath};
use crate::model::Value;

/// Accepted value kinds for a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    /// String value
    String,
    /// Integer value; integral floats are accepted
    Int,
    /// Numeric value; integers are widened
    Float,
    /// Boolean value
    Bool,
    /// Array value
    Array,
    /// Object value
    Object,
    /// Any value
    Any,
    /// An unevaluated query, executed by the function itself
    Query,
}

impl ParamKind {
    /// Validate a value against this kind, applying numeric coercion
    fn check(self, name: &str, value: Value) -> Result<Value, ParamError> {
        let checked = match (self, value) {
            (ParamKind::Any, v) => Ok(v),
            (ParamKind::String, Value::String(s)) => Ok(Value::String(s)),
            (ParamKind::String, Value::Bytes(b)) => {
                Ok(Value::String(String::from_utf8_lossy(&b).into_owned()))
            }
            (ParamKind::Int, Value::Int(i)) => Ok(Value::Int(i)),
            (ParamKind::Int, v @ Value::Float(_)) => v.as_i64().map(Value::Int).ok_or(v),
            (ParamKind::Float, v @ (Value::Int(_) | Value::Float(_))) => {
                Ok(Value::Float(v.as_f64().unwrap_or_default()))
            }
            (ParamKind::Bool, Value::Bool(b)) => Ok(Value::Bool(b)),
            (ParamKind::Array, v @ Value::Array(_)) => Ok(v),
            (ParamKind::Object, v @ Value::Object(_)) => Ok(v),
            (_, v) => Err(v),
        };
        checked.map_err(|v| ParamError::WrongType {
            name: name.to_string(),
            expected: self.to_string(),
            actual: v.type_name().to_string(),
        })
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParamKind::String => "string",
            ParamKind::Int => "integer",
            ParamKind::Float => "number",
            ParamKind::Bool => "bool",
            ParamKind::Array => "array",
            ParamKind::Object => "object",
            ParamKind::Any => "any",
            ParamKind::Query => "query",
        };
        write!(f, "{s}")
    }
}

/// A single declared parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    /// Parameter name, usable as a named argument
    pub name: String,
    /// Human readable description
    pub description: String,
    /// Accepted kind
    pub kind: ParamKind,
    /// Whether the parameter may be omitted
    pub optional: bool,
    /// Value used when omitted
    pub default: Option<Value>,
}

impl Param {
    /// Create a required parameter of any kind
    pub fn new(name: impl Into<String>, kind: ParamKind, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind,
            optional: false,
            default: None,
        }
    }

    /// Required string parameter
    pub fn string(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamKind::String, description)
    }

    /// Required integer parameter
    pub fn int(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Int, description)
    }

    /// Required numeric parameter
    pub fn float(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Float, description)
    }

    /// Required boolean parameter
    pub fn bool(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Bool, description)
    }

    /// Required parameter accepting any value
    pub fn any(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Any, description)
    }

    /// Required query parameter
    pub fn query(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Query, description)
    }

    /// Mark the parameter optional
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Give the parameter a default, which also makes it optional
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.optional = true;
        self.default = Some(value.into());
        self
    }
}

/// One argument at a call site
#[derive(Debug, Clone)]
pub struct CallArg {
    /// Name when given as `name: value`
    pub name: Option<String>,
    /// Argument expression
    pub value: FunctionRef,
}

impl CallArg {
    /// Positional argument
    pub fn positional(value: FunctionRef) -> Self {
        Self { name: None, value }
    }

    /// Named argument
    pub fn named(name: impl Into<String>, value: FunctionRef) -> Self {
        Self {
            name: Some(name.into()),
            value,
        }
    }
}

/// Ordered parameter schema
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    params: Vec<Param>,
}

impl Params {
    /// Empty schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter
    pub fn add(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    /// Declared parameters in order
    pub fn iter(&self) -> std::slice::Iter<'_, Param> {
        self.params.iter()
    }

    /// Number of declared parameters
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Check if the schema declares nothing
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Bind call-site arguments to this schema
    pub fn bind(&self, args: Vec<CallArg>) -> Result<ParsedParams, ParamError> {
        let total = args.len();
        let mut slots: Vec<Option<FunctionRef>> = vec![None; self.params.len()];
        let mut next_positional = 0;

        for arg in args {
            let index = match &arg.name {
                Some(name) => self
                    .params
                    .iter()
                    .position(|p| &p.name == name)
                    .ok_or_else(|| ParamError::Unknown { name: name.clone() })?,
                None => {
                    let index = next_positional;
                    next_positional += 1;
                    if index >= self.params.len() {
                        return Err(ParamError::TooMany {
                            expected: self.params.len(),
                            actual: total,
                        });
                    }
                    index
                }
            };
            if slots[index].is_some() {
                return Err(ParamError::Duplicate {
                    name: self.params[index].name.clone(),
                });
            }
            slots[index] = Some(arg.value);
        }

        let mut entries = Vec::with_capacity(self.params.len());
        for (param, slot) in self.params.iter().zip(slots) {
            let bound = match slot {
                None => match (&param.default, param.optional) {
                    (Some(default), _) => Bound::Static(default.clone()),
                    (None, true) => Bound::Absent,
                    (None, false) => {
                        return Err(ParamError::Missing {
                            name: param.name.clone(),
                        });
                    }
                },
                Some(node) if param.kind == ParamKind::Query => Bound::Query(node),
                Some(node) => match node.as_literal() {
                    Some(literal) => Bound::Static(param.kind.check(&param.name, literal.clone())?),
                    None => Bound::Dynamic(node),
                },
            };
            entries.push(BoundParam {
                name: param.name.clone(),
                kind: param.kind,
                value: bound,
            });
        }

        Ok(ParsedParams { entries })
    }
}

#[derive(Debug, Clone)]
enum Bound {
    Static(Value),
    Dynamic(FunctionRef),
    Query(FunctionRef),
    Absent,
}

#[derive(Debug, Clone)]
struct BoundParam {
    name: String,
    kind: ParamKind,
    value: Bound,
}

/// Arguments bound to a schema, with typed accessors
#[derive(Debug, Clone, Default)]
pub struct ParsedParams {
    entries: Vec<BoundParam>,
}

impl ParsedParams {
    /// Whether any argument must be resolved per evaluation
    pub fn is_dynamic(&self) -> bool {
        self.entries
            .iter()
            .any(|e| matches!(e.value, Bound::Dynamic(_)))
    }

    /// Evaluate dynamic arguments against a context, producing a fully
    /// static binding. `name` identifies the call in errors.
    pub fn resolve(&self, name: &str, ctx: &EvaluationContext) -> EvaluationResult<ParsedParams> {
        let mut entries = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let value = match &entry.value {
                Bound::Dynamic(node) => {
                    let value = node.exec(ctx)?;
                    let checked = entry.kind.check(&entry.name, value).map_err(|source| {
                        EvaluationError::Build {
                            name: name.to_string(),
                            source: source.into(),
                        }
                    })?;
                    Bound::Static(checked)
                }
                other => other.clone(),
            };
            entries.push(BoundParam {
                name: entry.name.clone(),
                kind: entry.kind,
                value,
            });
        }
        Ok(ParsedParams { entries })
    }

    /// Targets of every argument that reads the context
    pub fn query_targets(&self) -> Vec<TargetPath> {
        self.entries
            .iter()
            .flat_map(|e| match &e.value {
                Bound::Dynamic(node) | Bound::Query(node) => node.query_targets(),
                _ => Vec::new(),
            })
            .collect()
    }

    fn entry(&self, name: &str) -> Result<&BoundParam, ParamError> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| ParamError::Unknown {
                name: name.to_string(),
            })
    }

    fn optional_value(&self, name: &str) -> Result<Option<&Value>, ParamError> {
        let entry = self.entry(name)?;
        match &entry.value {
            Bound::Static(v) => Ok(Some(v)),
            Bound::Absent => Ok(None),
            Bound::Dynamic(_) => Err(ParamError::Invalid {
                name: name.to_string(),
                message: "value has not been resolved".to_string(),
            }),
            Bound::Query(_) => Err(ParamError::WrongType {
                name: name.to_string(),
                expected: "value".to_string(),
                actual: ParamKind::Query.to_string(),
            }),
        }
    }

    /// Any parameter value
    pub fn field_value(&self, name: &str) -> Result<&Value, ParamError> {
        self.optional_value(name)?.ok_or_else(|| ParamError::Missing {
            name: name.to_string(),
        })
    }

    /// Optional parameter value
    pub fn field_optional_value(&self, name: &str) -> Result<Option<&Value>, ParamError> {
        self.optional_value(name)
    }

    /// String parameter
    pub fn field_string(&self, name: &str) -> Result<String, ParamError> {
        expect_string(name, self.field_value(name)?)
    }

    /// Optional string parameter
    pub fn field_optional_string(&self, name: &str) -> Result<Option<String>, ParamError> {
        self.optional_value(name)?
            .map(|v| expect_string(name, v))
            .transpose()
    }

    /// Integer parameter
    pub fn field_int(&self, name: &str) -> Result<i64, ParamError> {
        expect_int(name, self.field_value(name)?)
    }

    /// Optional integer parameter
    pub fn field_optional_int(&self, name: &str) -> Result<Option<i64>, ParamError> {
        self.optional_value(name)?
            .map(|v| expect_int(name, v))
            .transpose()
    }

    /// Numeric parameter
    pub fn field_float(&self, name: &str) -> Result<f64, ParamError> {
        let value = self.field_value(name)?;
        value.as_f64().ok_or_else(|| wrong_type(name, "number", value))
    }

    /// Boolean parameter
    pub fn field_bool(&self, name: &str) -> Result<bool, ParamError> {
        match self.field_value(name)? {
            Value::Bool(b) => Ok(*b),
            other => Err(wrong_type(name, "bool", other)),
        }
    }

    /// Query parameter
    pub fn field_query(&self, name: &str) -> Result<FunctionRef, ParamError> {
        match &self.entry(name)?.value {
            Bound::Query(node) | Bound::Dynamic(node) => Ok(node.clone()),
            Bound::Static(v) => Ok(super::function::Literal::arc(v.clone())),
            Bound::Absent => Err(ParamError::Missing {
                name: name.to_string(),
            }),
        }
    }
}

fn wrong_type(name: &str, expected: &str, value: &Value) -> ParamError {
    ParamError::WrongType {
        name: name.to_string(),
        expected: expected.to_string(),
        actual: value.type_name().to_string(),
    }
}

fn expect_string(name: &str, value: &Value) -> Result<String, ParamError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        other => Err(wrong_type(name, "string", other)),
    }
}

fn expect_int(name: &str, value: &Value) -> Result<i64, ParamError> {
    value.as_i64().ok_or_else(|| wrong_type(name, "integer", value))
}
