use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Domain-level errors, one variant per error class
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// Invalid equipment documents or service settings. Fatal at startup, rejected on reload.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Broker unreachable or a queue operation failed. Retried, never fatal.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed payload. Dead-lettered without retry.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Sink write error: {0}")]
    SinkWrite(#[from] SinkWriteError),

    #[error("Equipment not found: {0}")]
    EquipmentNotFound(String),
}

impl DomainError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Configuration(_) | Self::EquipmentNotFound(_) => ErrorClass::Configuration,
            Self::Transport(_) => ErrorClass::Transport,
            Self::Validation(_) => ErrorClass::Validation,
            Self::SinkWrite(e) => e.class(),
        }
    }
}

/// Failure reported by the time-series sink.
///
/// Cloneable so a single failed flush can be handed to every submitter whose
/// records were part of the batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkWriteError {
    /// Network failure, timeout, HTTP 5xx or 429. Worth retrying.
    #[error("transient: {0}")]
    Transient(String),

    /// Rejected payload or credentials (HTTP 4xx). Retrying cannot help.
    #[error("permanent: {0}")]
    Permanent(String),
}

impl SinkWriteError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Transient(_) => ErrorClass::SinkTransient,
            Self::Permanent(_) => ErrorClass::SinkPermanent,
        }
    }
}

/// Error classes as reported on the health surface and in dead-letter entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorClass {
    Configuration,
    Transport,
    Validation,
    SinkTransient,
    SinkPermanent,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Transport => "transport",
            Self::Validation => "validation",
            Self::SinkTransient => "sinkTransient",
            Self::SinkPermanent => "sinkPermanent",
        }
    }
}

pub type Result<T> = std::result::Result<T, DomainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_class_mapping() {
        assert_eq!(
            DomainError::Configuration("x".into()).class(),
            ErrorClass::Configuration
        );
        assert_eq!(DomainError::Transport("x".into()).class(), ErrorClass::Transport);
        assert_eq!(
            DomainError::Validation("x".into()).class(),
            ErrorClass::Validation
        );
        assert_eq!(
            DomainError::from(SinkWriteError::Transient("503".into())).class(),
            ErrorClass::SinkTransient
        );
        assert_eq!(
            DomainError::from(SinkWriteError::Permanent("400".into())).class(),
            ErrorClass::SinkPermanent
        );
    }

    #[test]
    fn test_error_class_serializes_camel_case() {
        let json = serde_json::to_string(&ErrorClass::SinkTransient).unwrap();
        assert_eq!(json, "\"sinkTransient\"");
        assert_eq!(ErrorClass::SinkTransient.as_str(), "sinkTransient");
    }
}
