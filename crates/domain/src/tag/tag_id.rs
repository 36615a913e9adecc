use crate::error::{DomainError, Result};
use serde::{Deserialize, Serialize};

/// Identifier for tags and equipment.
///
/// Rules:
/// - Must be non-empty
/// - Alphanumeric, underscore, hyphen, dot and forward slash only
/// - Max length 100 characters
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TagId(String);

impl TagId {
    /// Create a new TagId with validation
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        validate_identifier("Tag ID", &id)?;
        Ok(Self(id))
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Shared identifier rule for tag and equipment ids
pub fn validate_identifier(kind: &str, id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(DomainError::Configuration(format!("{kind} cannot be empty")));
    }

    if id.len() > 100 {
        return Err(DomainError::Configuration(format!(
            "{kind} too long: {} chars (max 100)",
            id.len()
        )));
    }

    if !id
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '/' | '.'))
    {
        return Err(DomainError::Configuration(format!(
            "{kind} {id} must contain only alphanumeric, underscore, hyphen, dot, and forward slash"
        )));
    }

    Ok(())
}

impl TryFrom<String> for TagId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<TagId> for String {
    fn from(id: TagId) -> Self {
        id.0
    }
}

impl std::fmt::Display for TagId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_tag_id() {
        let id = TagId::new("temperature").unwrap();
        assert_eq!(id.as_str(), "temperature");
    }

    #[test]
    fn test_tag_id_with_hyphen_and_dot() {
        let id = TagId::new("zone-1.pv").unwrap();
        assert_eq!(id.as_str(), "zone-1.pv");
    }

    #[test]
    fn test_tag_id_hierarchical() {
        let id = TagId::new("line1/oven1/temp").unwrap();
        assert_eq!(id.as_str(), "line1/oven1/temp");
    }

    #[test]
    fn test_empty_tag_id() {
        let result = TagId::new("");
        assert_eq!(
            result.unwrap_err(),
            DomainError::Configuration("Tag ID cannot be empty".to_string())
        );
    }

    #[test]
    fn test_tag_id_too_long() {
        assert!(TagId::new("A".repeat(101)).is_err());
    }

    #[test]
    fn test_tag_id_invalid_characters() {
        assert!(TagId::new("temp@oven#1").is_err());
        assert!(TagId::new("has space").is_err());
    }

    #[test]
    fn test_deserialize_rejects_invalid() {
        assert!(serde_json::from_str::<TagId>("\"ok_id\"").is_ok());
        assert!(serde_json::from_str::<TagId>("\"\"").is_err());
    }

    #[test]
    fn test_tag_id_display() {
        let id = TagId::new("TEST_TAG").unwrap();
        assert_eq!(format!("{}", id), "TEST_TAG");
    }
}
