//! Registry error types

use crate::source::{SourceId, SourceKey};

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Source id is not configured, disabled, or has no address
    UnknownSource(SourceId),
    /// No handler exists for the key
    StreamNotFound(SourceKey),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::UnknownSource(id) => write!(f, "Unknown source: {}", id),
            RegistryError::StreamNotFound(key) => write!(f, "Stream not found: {}", key),
        }
    }
}

impl std::error::Error for RegistryError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Quality;

    #[test]
    fn test_display() {
        let err = RegistryError::UnknownSource(SourceId::new("9"));
        assert_eq!(err.to_string(), "Unknown source: 9");

        let err = RegistryError::StreamNotFound(SourceKey::new("9", Quality::Secondary));
        assert_eq!(err.to_string(), "Stream not found: 9/sub");
    }
}
