//! Capabilities visible to the parser

use std::sync::Arc;

use crate::query::{FunctionSet, MethodSet, NamedMappings};

/// The functions, methods and named mappings a mapping may reference.
///
/// A context is an immutable snapshot: filtering returns a new context and
/// never touches the registries it was derived from.
#[derive(Debug, Clone)]
pub struct ParsingContext {
    functions: Arc<FunctionSet>,
    methods: Arc<MethodSet>,
    maps: Arc<NamedMappings>,
}

impl ParsingContext {
    /// Create a context over the given registries with no named mappings
    pub fn new(functions: FunctionSet, methods: MethodSet) -> Self {
        Self {
            functions: Arc::new(functions),
            methods: Arc::new(methods),
            maps: Arc::new(NamedMappings::default()),
        }
    }

    /// Functions callable from a mapping
    pub fn functions(&self) -> &FunctionSet {
        &self.functions
    }

    /// Methods callable from a mapping
    pub fn methods(&self) -> &MethodSet {
        &self.methods
    }

    /// Named mappings supplied by the caller
    pub fn maps(&self) -> &Arc<NamedMappings> {
        &self.maps
    }

    /// Keep only functions without side effects
    pub fn only_pure(&self) -> Self {
        self.with_functions(self.functions.only_pure())
    }

    /// Keep only functions that do not read the current message
    pub fn no_message(&self) -> Self {
        self.with_functions(self.functions.no_message())
    }

    /// Remove functions by name
    pub fn without_functions<S: AsRef<str>>(&self, names: &[S]) -> Self {
        self.with_functions(self.functions.without(names))
    }

    /// Remove methods by name
    pub fn without_methods<S: AsRef<str>>(&self, names: &[S]) -> Self {
        self.with_methods(self.methods.without(names))
    }

    /// Same context with a different function set
    pub fn with_functions(&self, functions: FunctionSet) -> Self {
        Self {
            functions: Arc::new(functions),
            ..self.clone()
        }
    }

    /// Same context with a different method set
    pub fn with_methods(&self, methods: MethodSet) -> Self {
        Self {
            methods: Arc::new(methods),
            ..self.clone()
        }
    }

    /// Same context with caller-supplied named mappings
    pub fn with_maps(&self, maps: Arc<NamedMappings>) -> Self {
        Self {
            maps,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::functions::builtin_functions;
    use crate::query::methods::builtin_methods;

    fn context() -> ParsingContext {
        let mut functions = FunctionSet::new("function");
        for entry in builtin_functions() {
            functions.add(entry).unwrap();
        }
        let mut methods = MethodSet::new("method");
        for entry in builtin_methods() {
            methods.add(entry).unwrap();
        }
        ParsingContext::new(functions, methods)
    }

    #[test]
    fn test_filters_derive_new_contexts() {
        let ctx = context();
        let sandboxed = ctx.only_pure().no_message();

        assert!(ctx.functions().contains("env"));
        assert!(ctx.functions().contains("content"));
        assert!(!sandboxed.functions().contains("env"));
        assert!(!sandboxed.functions().contains("content"));
        assert!(sandboxed.functions().contains("range"));
        assert_eq!(sandboxed.methods().len(), ctx.methods().len());
    }

    #[test]
    fn test_without() {
        let ctx = context().without_methods(&["uppercase"]).without_functions(&["now"]);
        assert!(!ctx.methods().contains("uppercase"));
        assert!(ctx.methods().contains("lowercase"));
        assert!(!ctx.functions().contains("now"));
    }
}
