//! Executable nodes of a compiled mapping
//!
//! Every parsed expression becomes a tree of [`Function`] nodes. Trees are
//! built once at parse time and are immutable afterwards, so a single tree
//! may be evaluated concurrently against independent contexts.

use std::fmt;
use std::sync::Arc;

use super::context::EvaluationContext;
use super::error::{BuildError, EvaluationError, EvaluationResult};
use super::params::ParsedParams;
use crate::model::{Object, Value};

/// Shared handle to an executable node
pub type FunctionRef = Arc<dyn Function>;

/// Which part of the evaluation context a query reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    /// The current value (`this`)
    Value,
    /// Message metadata
    Metadata,
    /// A variable
    Variable,
}

/// A static description of one input a node depends on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetPath {
    /// Context area being read
    pub kind: TargetKind,
    /// Path within that area
    pub path: Vec<String>,
}

impl TargetPath {
    /// Create a target path
    pub fn new(kind: TargetKind, path: Vec<String>) -> Self {
        Self { kind, path }
    }
}

/// A unit of a compiled expression tree
pub trait Function: Send + Sync + fmt::Debug {
    /// Evaluate against a context. Never mutates the context.
    fn exec(&self, ctx: &EvaluationContext) -> EvaluationResult<Value>;

    /// Static list of the context inputs this node reads
    fn query_targets(&self) -> Vec<TargetPath>;

    /// The constant value of this node when it is a literal
    fn as_literal(&self) -> Option<&Value> {
        None
    }
}

/// Collect the targets of several nodes
pub fn collect_targets<'a>(nodes: impl IntoIterator<Item = &'a FunctionRef>) -> Vec<TargetPath> {
    nodes.into_iter().flat_map(|n| n.query_targets()).collect()
}

/// A constant value
#[derive(Debug, Clone)]
pub struct Literal {
    value: Value,
}

impl Literal {
    /// Create a literal node
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    /// Create a shared literal node
    pub fn arc(value: Value) -> FunctionRef {
        Arc::new(Self::new(value))
    }
}

impl Function for Literal {
    fn exec(&self, _ctx: &EvaluationContext) -> EvaluationResult<Value> {
        Ok(self.value.clone())
    }

    fn query_targets(&self) -> Vec<TargetPath> {
        Vec::new()
    }

    fn as_literal(&self) -> Option<&Value> {
        Some(&self.value)
    }
}

/// Field access on `this` or on the result of another node.
/// Missing fields resolve to null.
#[derive(Debug)]
pub struct FieldAccess {
    target: Option<FunctionRef>,
    path: Vec<String>,
}

impl FieldAccess {
    /// Access a path of the current value
    pub fn this(path: Vec<String>) -> Self {
        Self { target: None, path }
    }

    /// Access a path of another node's result
    pub fn of(target: FunctionRef, path: Vec<String>) -> Self {
        Self {
            target: Some(target),
            path,
        }
    }

    /// Extend the accessed path, consuming the node
    pub fn push(mut self, segment: String) -> Self {
        self.path.push(segment);
        self
    }
}

impl Function for FieldAccess {
    fn exec(&self, ctx: &EvaluationContext) -> EvaluationResult<Value> {
        match &self.target {
            None => Ok(ctx
                .value()
                .get_path(&self.path)
                .cloned()
                .unwrap_or(Value::Null)),
            Some(target) => {
                let value = target.exec(ctx)?;
                Ok(value.get_path(&self.path).cloned().unwrap_or(Value::Null))
            }
        }
    }

    fn query_targets(&self) -> Vec<TargetPath> {
        match &self.target {
            None => vec![TargetPath::new(TargetKind::Value, self.path.clone())],
            Some(target) => target
                .query_targets()
                .into_iter()
                .map(|mut t| {
                    t.path.extend(self.path.iter().cloned());
                    t
                })
                .collect(),
        }
    }
}

/// A `$name` variable reference
#[derive(Debug)]
pub struct VariableRef {
    name: String,
}

impl VariableRef {
    /// Create a variable reference
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Function for VariableRef {
    fn exec(&self, ctx: &EvaluationContext) -> EvaluationResult<Value> {
        ctx.variable(&self.name).cloned()
    }

    fn query_targets(&self) -> Vec<TargetPath> {
        vec![TargetPath::new(TargetKind::Variable, vec![self.name.clone()])]
    }
}

/// `[a, b, c]`; elements evaluating to `Nothing` are skipped
#[derive(Debug)]
pub struct ArrayLiteral {
    items: Vec<FunctionRef>,
}

impl ArrayLiteral {
    /// Create an array literal node
    pub fn new(items: Vec<FunctionRef>) -> Self {
        Self { items }
    }
}

impl Function for ArrayLiteral {
    fn exec(&self, ctx: &EvaluationContext) -> EvaluationResult<Value> {
        let mut out = Vec::with_capacity(self.items.len());
        for item in &self.items {
            match item.exec(ctx)? {
                Value::Nothing => {}
                v => out.push(v),
            }
        }
        Ok(Value::Array(out))
    }

    fn query_targets(&self) -> Vec<TargetPath> {
        collect_targets(&self.items)
    }
}

/// `{"key": value}`; entries evaluating to `Nothing` are skipped
#[derive(Debug)]
pub struct ObjectLiteral {
    entries: Vec<(String, FunctionRef)>,
}

impl ObjectLiteral {
    /// Create an object literal node
    pub fn new(entries: Vec<(String, FunctionRef)>) -> Self {
        Self { entries }
    }
}

impl Function for ObjectLiteral {
    fn exec(&self, ctx: &EvaluationContext) -> EvaluationResult<Value> {
        let mut out = Object::with_capacity(self.entries.len());
        for (key, item) in &self.entries {
            match item.exec(ctx)? {
                Value::Nothing => {}
                v => {
                    out.insert(key.clone(), v);
                }
            }
        }
        Ok(Value::Object(out))
    }

    fn query_targets(&self) -> Vec<TargetPath> {
        collect_targets(self.entries.iter().map(|(_, f)| f))
    }
}

/// `if a { x } else if b { y } else { z }`
#[derive(Debug)]
pub struct IfElse {
    branches: Vec<(FunctionRef, FunctionRef)>,
    otherwise: Option<FunctionRef>,
}

impl IfElse {
    /// Create a conditional node
    pub fn new(branches: Vec<(FunctionRef, FunctionRef)>, otherwise: Option<FunctionRef>) -> Self {
        Self {
            branches,
            otherwise,
        }
    }
}

impl Function for IfElse {
    fn exec(&self, ctx: &EvaluationContext) -> EvaluationResult<Value> {
        for (condition, body) in &self.branches {
            match condition.exec(ctx)? {
                Value::Bool(true) => return body.exec(ctx),
                Value::Bool(false) => {}
                other => return Err(EvaluationError::type_mismatch("if", "bool", &other)),
            }
        }
        match &self.otherwise {
            Some(body) => body.exec(ctx),
            None => Ok(Value::Nothing),
        }
    }

    fn query_targets(&self) -> Vec<TargetPath> {
        let mut targets = Vec::new();
        for (condition, body) in &self.branches {
            targets.extend(condition.query_targets());
            targets.extend(body.query_targets());
        }
        if let Some(body) = &self.otherwise {
            targets.extend(body.query_targets());
        }
        targets
    }
}

type Closure = dyn Fn(&EvaluationContext) -> EvaluationResult<Value> + Send + Sync;

/// A node defined by a closure over captured sub-nodes
pub struct ClosureFunction {
    name: String,
    closure: Box<Closure>,
    targets: Vec<TargetPath>,
}

impl ClosureFunction {
    /// Create a closure node with its precomputed query targets
    pub fn new<F>(name: impl Into<String>, closure: F, targets: Vec<TargetPath>) -> Self
    where
        F: Fn(&EvaluationContext) -> EvaluationResult<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            closure: Box::new(closure),
            targets,
        }
    }

    /// Create a shared closure node
    pub fn arc<F>(name: impl Into<String>, closure: F, targets: Vec<TargetPath>) -> FunctionRef
    where
        F: Fn(&EvaluationContext) -> EvaluationResult<Value> + Send + Sync + 'static,
    {
        Arc::new(Self::new(name, closure, targets))
    }

    /// Annotation naming this node in errors
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for ClosureFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClosureFunction")
            .field("name", &self.name)
            .field("targets", &self.targets)
            .finish()
    }
}

impl Function for ClosureFunction {
    fn exec(&self, ctx: &EvaluationContext) -> EvaluationResult<Value> {
        (self.closure)(ctx)
    }

    fn query_targets(&self) -> Vec<TargetPath> {
        self.targets.clone()
    }
}

type Builder = dyn Fn(&ParsedParams) -> Result<FunctionRef, BuildError> + Send + Sync;

/// A call whose arguments are only known at evaluation time. The arguments
/// are resolved against each context and the node is constructed per call.
pub struct DynamicArgs {
    name: String,
    params: ParsedParams,
    build: Box<Builder>,
    targets: Vec<TargetPath>,
}

impl DynamicArgs {
    /// Create a dynamic-argument node. `targets` are the targets of anything
    /// the builder captures besides the arguments themselves.
    pub fn new<F>(
        name: impl Into<String>,
        params: ParsedParams,
        mut targets: Vec<TargetPath>,
        build: F,
    ) -> Self
    where
        F: Fn(&ParsedParams) -> Result<FunctionRef, BuildError> + Send + Sync + 'static,
    {
        targets.extend(params.query_targets());
        Self {
            name: name.into(),
            params,
            build: Box::new(build),
            targets,
        }
    }
}

impl fmt::Debug for DynamicArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicArgs")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish()
    }
}

impl Function for DynamicArgs {
    fn exec(&self, ctx: &EvaluationContext) -> EvaluationResult<Value> {
        let resolved = self.params.resolve(&self.name, ctx)?;
        let node = (self.build)(&resolved).map_err(|source| EvaluationError::Build {
            name: self.name.clone(),
            source,
        })?;
        node.exec(ctx)
    }

    fn query_targets(&self) -> Vec<TargetPath> {
        self.targets.clone()
    }
}
