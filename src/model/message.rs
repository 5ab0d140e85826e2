//! Message parts and batches threaded through a pipeline

use indexmap::IndexMap;

use super::value::Value;

/// A single message: raw content plus string metadata
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Part {
    content: Vec<u8>,
    metadata: IndexMap<String, String>,
    error: Option<String>,
}

impl Part {
    /// Create a part from raw content
    pub fn new(content: impl Into<Vec<u8>>) -> Self {
        Self {
            content: content.into(),
            metadata: IndexMap::new(),
            error: None,
        }
    }

    /// Builder-style metadata insertion
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Raw content
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Replace the raw content
    pub fn set_content(&mut self, content: Vec<u8>) {
        self.content = content;
    }

    /// Structured view of the content
    pub fn value(&self) -> Value {
        Value::from_bytes(&self.content)
    }

    /// Metadata value by key
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// All metadata in insertion order
    pub fn metadata_map(&self) -> &IndexMap<String, String> {
        &self.metadata
    }

    /// Mutable access to metadata
    pub fn metadata_mut(&mut self) -> &mut IndexMap<String, String> {
        &mut self.metadata
    }

    /// Processing error recorded against this part, if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Flag this part as having failed a processing step
    pub fn set_error(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
    }
}

/// An ordered batch of message parts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageBatch {
    parts: Vec<Part>,
}

impl MessageBatch {
    /// Create a batch from parts
    pub fn new(parts: Vec<Part>) -> Self {
        Self { parts }
    }

    /// A batch with no parts. Contexts that must not see real messages use it.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of parts
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Check if the batch has no parts
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Part at index
    pub fn get(&self, index: usize) -> Option<&Part> {
        self.parts.get(index)
    }

    /// Iterate over parts
    pub fn iter(&self) -> std::slice::Iter<'_, Part> {
        self.parts.iter()
    }

    /// Take ownership of the parts
    pub fn into_parts(self) -> Vec<Part> {
        self.parts
    }
}

impl FromIterator<Part> for MessageBatch {
    fn from_iter<I: IntoIterator<Item = Part>>(iter: I) -> Self {
        Self {
            parts: iter.into_iter().collect(),
        }
    }
}
