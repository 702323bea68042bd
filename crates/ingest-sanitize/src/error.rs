use ingest_core::ResourceType;
use thiserror::Error;

/// A single field violating a declared limit, returned by [`crate::Sanitize::verify`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{resource:?}: {message}")]
pub struct Violation {
    pub resource: ResourceType,
    pub message: String,
}

impl Violation {
    pub fn new(resource: ResourceType, message: impl Into<String>) -> Self {
        Self {
            resource,
            message: message.into(),
        }
    }
}
