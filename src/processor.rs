//! Batch mapping processor

use std::sync::Arc;

use log::{debug, warn};

use crate::config::ProcessorConfig;
use crate::environment;
use crate::error::Result;
use crate::mapping::Mapping;
use crate::model::MessageBatch;
use crate::parser::parse_mapping;

/// Applies a compiled mapping to every message of a batch
#[derive(Debug, Clone)]
pub struct MappingProcessor {
    mapping: Arc<Mapping>,
}

impl MappingProcessor {
    /// Compile the configured mapping against the global environment,
    /// narrowed by the configured capabilities
    pub fn new(config: &ProcessorConfig) -> Result<Self> {
        let ctx = config.capabilities.apply(&environment::parsing_context());
        let mapping = parse_mapping(&ctx, "processor", &config.mapping)?;
        Ok(Self::from_mapping(mapping))
    }

    /// Wrap an already compiled mapping
    pub fn from_mapping(mapping: Mapping) -> Self {
        Self {
            mapping: Arc::new(mapping),
        }
    }

    /// The compiled mapping
    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    /// Map every part independently.
    ///
    /// Deleted parts are dropped. A part whose mapping fails is kept as it
    /// was, with its error set.
    pub fn process(&self, batch: MessageBatch) -> MessageBatch {
        let batch = Arc::new(batch);
        let mut output = Vec::with_capacity(batch.len());

        for (index, part) in batch.iter().enumerate() {
            match self.mapping.map_part(index, &batch) {
                Ok(Some(mapped)) => output.push(mapped),
                Ok(None) => debug!("message {index} deleted by mapping"),
                Err(e) => {
                    warn!("failed to map message {index}: {e}");
                    let mut failed = part.clone();
                    failed.set_error(e.to_string());
                    output.push(failed);
                }
            }
        }

        MessageBatch::new(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CapabilityConfig;
    use crate::model::Part;
    use pretty_assertions::assert_eq;

    fn processor(mapping: &str) -> MappingProcessor {
        MappingProcessor::new(&ProcessorConfig::new(mapping)).unwrap()
    }

    #[test]
    fn test_process_batch() {
        let proc = processor(
            r#"root = if this.drop == true { deleted() } else { this.n * 2 }
               meta seen = "yes""#,
        );
        let batch = MessageBatch::new(vec![
            Part::new(r#"{"n": 1}"#),
            Part::new(r#"{"drop": true}"#),
            Part::new(r#"{"n": "x"}"#),
        ]);

        let out: Vec<Part> = proc.process(batch).into_parts();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].content(), b"2");
        assert_eq!(out[0].metadata("seen"), Some("yes"));
        assert_eq!(out[0].error(), None);

        assert_eq!(out[1].content(), br#"{"n": "x"}"#);
        assert!(out[1].error().is_some());
        assert_eq!(out[1].metadata("seen"), None);
    }

    #[test]
    fn test_capabilities_are_enforced() {
        let config = ProcessorConfig {
            mapping: "root = content()".to_string(),
            capabilities: CapabilityConfig {
                no_message: true,
                ..Default::default()
            },
        };
        assert!(matches!(
            MappingProcessor::new(&config),
            Err(crate::Error::Parse(_))
        ));
    }
}
