//! Registry environments
//!
//! An [`Environment`] owns the function and method registries a mapping is
//! compiled against. A process-global environment holds every builtin and
//! plugin; components take snapshots of it through [`parsing_context`] and
//! [`sandbox_context`].

use log::warn;
use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::mapping::Mapping;
use crate::parser::{ParseResult, ParsingContext, parse_mapping};
use crate::plugins;
use crate::query::functions::builtin_functions;
use crate::query::methods::builtin_methods;
use crate::query::{FunctionEntry, FunctionSet, MethodEntry, MethodSet, RegistryError};

/// A set of functions and methods available to mappings
#[derive(Debug, Clone)]
pub struct Environment {
    functions: FunctionSet,
    methods: MethodSet,
}

impl Default for Environment {
    fn default() -> Self {
        Self::standard()
    }
}

impl Environment {
    /// An environment with nothing registered
    pub fn empty() -> Self {
        Self {
            functions: FunctionSet::new("function"),
            methods: MethodSet::new("method"),
        }
    }

    /// An environment with every builtin function, method and plugin
    pub fn standard() -> Self {
        let mut env = Self::empty();
        for entry in builtin_functions() {
            if let Err(e) = env.register_function(entry) {
                warn!("skipping builtin: {e}");
            }
        }
        for entry in builtin_methods().into_iter().chain(plugins::methods()) {
            if let Err(e) = env.register_method(entry) {
                warn!("skipping builtin: {e}");
            }
        }
        env
    }

    /// Add a function. Names must be unique.
    pub fn register_function(&mut self, entry: FunctionEntry) -> Result<(), RegistryError> {
        self.functions.add(entry)
    }

    /// Add a method. Names must be unique.
    pub fn register_method(&mut self, entry: MethodEntry) -> Result<(), RegistryError> {
        self.methods.add(entry)
    }

    /// Registered functions
    pub fn functions(&self) -> &FunctionSet {
        &self.functions
    }

    /// Registered methods
    pub fn methods(&self) -> &MethodSet {
        &self.methods
    }

    /// Copy keeping only pure functions
    pub fn only_pure(&self) -> Self {
        Self {
            functions: self.functions.only_pure(),
            methods: self.methods.clone(),
        }
    }

    /// Copy without functions that read the current message
    pub fn no_message(&self) -> Self {
        Self {
            functions: self.functions.no_message(),
            methods: self.methods.clone(),
        }
    }

    /// Copy without the named functions
    pub fn without_functions<S: AsRef<str>>(&self, names: &[S]) -> Self {
        Self {
            functions: self.functions.without(names),
            methods: self.methods.clone(),
        }
    }

    /// Copy without the named methods
    pub fn without_methods<S: AsRef<str>>(&self, names: &[S]) -> Self {
        Self {
            functions: self.functions.clone(),
            methods: self.methods.without(names),
        }
    }

    /// Snapshot of this environment for the parser
    pub fn parsing_context(&self) -> ParsingContext {
        ParsingContext::new(self.functions.clone(), self.methods.clone())
    }

    /// Compile a mapping against this environment
    pub fn parse(&self, text: &str) -> ParseResult<Mapping> {
        parse_mapping(&self.parsing_context(), "mapping", text)
    }
}

/// The global environment together with the contexts derived from it.
/// Contexts are rebuilt on registration so snapshots are cheap to take.
struct Global {
    env: Environment,
    context: ParsingContext,
    sandbox: ParsingContext,
}

impl Global {
    fn new(env: Environment) -> Self {
        let context = env.parsing_context();
        let sandbox = context.only_pure().no_message();
        Self {
            env,
            context,
            sandbox,
        }
    }

    fn refresh(&mut self) {
        self.context = self.env.parsing_context();
        self.sandbox = self.context.only_pure().no_message();
    }
}

static GLOBAL_ENVIRONMENT: Lazy<RwLock<Global>> =
    Lazy::new(|| RwLock::new(Global::new(Environment::standard())));

/// Register a function globally. Only affects snapshots taken afterwards.
pub fn register_function(entry: FunctionEntry) -> Result<(), RegistryError> {
    let mut global = GLOBAL_ENVIRONMENT.write();
    global.env.register_function(entry)?;
    global.refresh();
    Ok(())
}

/// Register a method globally. Only affects snapshots taken afterwards.
pub fn register_method(entry: MethodEntry) -> Result<(), RegistryError> {
    let mut global = GLOBAL_ENVIRONMENT.write();
    global.env.register_method(entry)?;
    global.refresh();
    Ok(())
}

/// Snapshot of the global environment. No lock is held once this returns.
pub fn parsing_context() -> ParsingContext {
    GLOBAL_ENVIRONMENT.read_recursive().context.clone()
}

/// Run `f` with read access to the global environment.
///
/// The lock is held for the duration of `f`. Mappings may be compiled
/// inside it, but registering from within `f` deadlocks.
pub fn with_global<R>(f: impl FnOnce(&Environment) -> R) -> R {
    f(&GLOBAL_ENVIRONMENT.read_recursive().env)
}

/// The restricted context used for mappings supplied at runtime: pure
/// functions that do not read the message, and every method.
///
/// Built once per registration; taking it only clones shared handles.
pub fn sandbox_context() -> ParsingContext {
    GLOBAL_ENVIRONMENT.read_recursive().sandbox.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Value;
    use crate::query::{Capabilities, Category, FunctionSpec, Literal};

    fn constant(name: &str) -> FunctionEntry {
        FunctionEntry::new(FunctionSpec::new(name, Category::General, ""), |_| {
            Ok(Literal::arc(Value::from("registered")))
        })
    }

    #[test]
    fn test_standard_registers_builtins_and_plugins() {
        let env = Environment::standard();
        assert!(env.functions().contains("range"));
        assert!(env.methods().contains("uppercase"));
        assert!(env.methods().contains("bloblang"));
    }

    #[test]
    fn test_duplicate_registration_keeps_original() {
        let mut env = Environment::standard();
        let err = env.register_function(constant("range")).unwrap_err();
        assert_eq!(
            err,
            RegistryError::Duplicate {
                kind: "function",
                name: "range".into()
            }
        );
        let mapping = env.parse("root = range(0, 2)").unwrap();
        assert_eq!(
            mapping.exec_value(Value::Null).unwrap(),
            Value::Array(vec![Value::Int(0), Value::Int(1)])
        );
    }

    #[test]
    fn test_filtered_copies() {
        let env = Environment::standard();
        let pure = env.only_pure();
        assert!(pure.functions().entries().all(|e| e.is_pure()));
        assert!(env.functions().contains("env"));

        let no_message = env.no_message();
        assert!(
            no_message
                .functions()
                .entries()
                .all(|e| !Capabilities::requires_message(e))
        );

        let trimmed = env.without_methods(&["bloblang"]);
        assert!(!trimmed.methods().contains("bloblang"));
        assert!(trimmed.parse("root = this.bloblang(\"root = 1\")").is_err());
    }

    #[test]
    fn test_global_registration_affects_later_snapshots() {
        let before = parsing_context();
        register_function(constant("environment_test_constant")).unwrap();
        let after = parsing_context();

        assert!(!before.functions().contains("environment_test_constant"));
        assert!(after.functions().contains("environment_test_constant"));
        assert!(with_global(|env| env.functions().contains("environment_test_constant")));
        assert!(register_function(constant("environment_test_constant")).is_err());
    }

    #[test]
    fn test_sandbox_context() {
        let sandbox = sandbox_context();
        for name in ["env", "file", "now", "timestamp_unix", "content", "json", "meta"] {
            assert!(!sandbox.functions().contains(name), "{name} should be filtered");
        }
        assert!(sandbox.functions().contains("range"));
        assert_eq!(
            sandbox.methods().len(),
            with_global(|env| env.methods().len())
        );
    }

    #[test]
    fn test_snapshots_share_registries() {
        let global = Global::new(Environment::standard());
        let a = global.sandbox.clone();
        let b = global.sandbox.clone();
        assert!(std::ptr::eq(a.functions(), b.functions()));
        assert!(std::ptr::eq(a.methods(), global.context.methods()));
        assert!(!a.functions().contains("env"));
    }

    #[test]
    fn test_compile_nested_mapping_inside_global_lock() {
        let mapping = with_global(|env| env.parse(r#"root = this.bloblang("root = this + 1")"#))
            .unwrap();
        assert_eq!(mapping.exec_value(Value::Int(1)).unwrap(), Value::Int(2));
    }
}
