//! Topic catalog: the topic names known for the signed-in owner.

use thiserror::Error;

/// Errors raised when validating a new topic name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopicError {
    #[error("Topic name cannot be empty")]
    Empty,

    #[error("Topic '{0}' already exists")]
    Duplicate(String),

    #[error("Topic '{0}' does not exist")]
    Unknown(String),
}

/// Ordered set of topic names. Names are case-sensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicCatalog {
    topics: Vec<String>,
}

impl TopicCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the catalog with the store's listing, dropping repeats.
    pub fn replace(&mut self, topics: Vec<String>) {
        self.topics.clear();
        for topic in topics {
            if !self.contains(&topic) {
                self.topics.push(topic);
            }
        }
    }

    /// Check that `name` could be added.
    pub fn validate_new(&self, name: &str) -> Result<(), TopicError> {
        if name.is_empty() {
            return Err(TopicError::Empty);
        }
        if self.contains(name) {
            return Err(TopicError::Duplicate(name.to_string()));
        }
        Ok(())
    }

    /// Append a topic after validating it. The catalog is unchanged on error.
    pub fn add(&mut self, name: &str) -> Result<(), TopicError> {
        self.validate_new(name)?;
        self.topics.push(name.to_string());
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.topics.iter().any(|t| t == name)
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn clear(&mut self) {
        self.topics.clear();
    }
}
