//! Processor configuration

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::parser::ParsingContext;

/// Restrictions applied to the global environment before compiling
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CapabilityConfig {
    /// Drop functions with side effects
    pub only_pure: bool,
    /// Drop functions that read the current message
    pub no_message: bool,
    /// Functions removed by name
    pub disabled_functions: Vec<String>,
    /// Methods removed by name
    pub disabled_methods: Vec<String>,
}

impl CapabilityConfig {
    /// Narrow a parsing context according to this configuration
    pub fn apply(&self, ctx: &ParsingContext) -> ParsingContext {
        let mut ctx = ctx
            .without_functions(&self.disabled_functions)
            .without_methods(&self.disabled_methods);
        if self.only_pure {
            ctx = ctx.only_pure();
        }
        if self.no_message {
            ctx = ctx.no_message();
        }
        ctx
    }
}

/// Configuration of a [`MappingProcessor`](crate::processor::MappingProcessor)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Mapping text
    pub mapping: String,
    /// Capability restrictions for the mapping
    pub capabilities: CapabilityConfig,
}

impl ProcessorConfig {
    /// Create a configuration for a mapping with no restrictions
    pub fn new(mapping: impl Into<String>) -> Self {
        Self {
            mapping: mapping.into(),
            capabilities: CapabilityConfig::default(),
        }
    }

    /// Load a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
