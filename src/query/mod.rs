//! Query engine: executable nodes, evaluation context, builtins and the
//! registries that expose them to the parser

pub mod context;
pub mod error;
pub mod function;
pub mod functions;
pub mod methods;
pub mod operators;
pub mod params;
pub mod registry;
pub mod spec;

pub use context::{EvaluationContext, MAX_MAPPING_DEPTH, NamedMappings, Variables};
pub use error::{BuildError, EvaluationError, EvaluationResult, ParamError, RegistryError};
pub use function::{
    ArrayLiteral, ClosureFunction, DynamicArgs, FieldAccess, Function, FunctionRef, IfElse,
    Literal, ObjectLiteral, TargetKind, TargetPath, VariableRef,
};
pub use operators::{Arithmetic, BinaryOp, Coalesce, Negate, Not};
pub use params::{CallArg, Param, ParamKind, Params, ParsedParams};
pub use registry::{FunctionSet, MethodSet, Registry};
pub use spec::{
    Capabilities, Category, Example, FunctionCtor, FunctionEntry, FunctionSpec, MethodCtor,
    MethodEntry, MethodSpec, Status,
};
