//! Registries of function and method specifications
//!
//! A [`Registry`] maps names to entries in registration order. Filtering
//! never mutates the source registry; each filter returns a new registry
//! containing the surviving entries, so views can be composed freely.

use indexmap::IndexMap;
use log::debug;

use super::error::RegistryError;
use super::spec::{Capabilities, FunctionEntry, MethodEntry};

/// Registry of functions
pub type FunctionSet = Registry<FunctionEntry>;

/// Registry of methods
pub type MethodSet = Registry<MethodEntry>;

/// Name-keyed catalog of builtin entries
#[derive(Debug, Clone)]
pub struct Registry<E> {
    kind: &'static str,
    entries: IndexMap<String, E>,
}

impl<E: Capabilities + Clone> Registry<E> {
    /// Create an empty registry. `kind` names the entries in errors.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: IndexMap::new(),
        }
    }

    /// Register an entry. A name collision leaves the existing entry intact.
    pub fn add(&mut self, entry: E) -> Result<(), RegistryError> {
        let name = entry.name().to_string();
        if self.entries.contains_key(&name) {
            return Err(RegistryError::Duplicate {
                kind: self.kind,
                name,
            });
        }
        debug!("registered {} '{}'", self.kind, name);
        self.entries.insert(name, entry);
        Ok(())
    }

    /// Look up an entry by name
    pub fn lookup(&self, name: &str) -> Option<&E> {
        self.entries.get(name)
    }

    /// Check whether a name is registered
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Registered entries in registration order
    pub fn entries(&self) -> impl Iterator<Item = &E> {
        self.entries.values()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check for an empty registry
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries kind, e.g. "function"
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// New registry holding the entries matching `predicate`
    pub fn filter(&self, predicate: impl Fn(&E) -> bool) -> Self {
        Self {
            kind: self.kind,
            entries: self
                .entries
                .iter()
                .filter(|(_, e)| predicate(e))
                .map(|(k, e)| (k.clone(), e.clone()))
                .collect(),
        }
    }

    /// New registry holding only pure entries
    pub fn only_pure(&self) -> Self {
        self.filter(|e| e.is_pure())
    }

    /// New registry holding only entries that never read the message
    pub fn no_message(&self) -> Self {
        self.filter(|e| !e.requires_message())
    }

    /// New registry without the named entries
    pub fn without<S: AsRef<str>>(&self, names: &[S]) -> Self {
        self.filter(|e| !names.iter().any(|n| n.as_ref() == e.name()))
    }
}
