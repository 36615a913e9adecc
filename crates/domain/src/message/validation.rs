use std::collections::HashSet;

use serde_json::Value;

use crate::error::{DomainError, Result};
use crate::message::{QueueEnvelope, TransportMessage};

/// Parses a raw queue payload into an envelope and checks its structure.
///
/// Accepts both a full envelope and a bare `TransportMessage`; the latter is
/// wrapped with `default_max_retries`. Every failure is a `Validation` error.
pub fn decode_envelope(raw: &str, default_max_retries: u32) -> Result<QueueEnvelope> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| DomainError::Validation(format!("invalid JSON: {e}")))?;

    let Value::Object(fields) = &value else {
        return Err(DomainError::Validation(
            "payload must be a JSON object".to_string(),
        ));
    };

    let envelope = if fields.contains_key("message") {
        serde_json::from_value::<QueueEnvelope>(value)
            .map_err(|e| DomainError::Validation(format!("invalid envelope: {e}")))?
    } else {
        let message = serde_json::from_value::<TransportMessage>(value)
            .map_err(|e| DomainError::Validation(format!("invalid message: {e}")))?;
        QueueEnvelope::new(message, default_max_retries)
    };

    validate_message(&envelope.message)?;
    Ok(envelope)
}

/// Structural rules beyond what deserialization enforces
pub fn validate_message(message: &TransportMessage) -> Result<()> {
    if message.id.trim().is_empty() {
        return Err(DomainError::Validation("message id is empty".to_string()));
    }
    if message.equipment_id.trim().is_empty() {
        return Err(DomainError::Validation("equipmentId is empty".to_string()));
    }

    let labels = [
        ("equipmentId", message.equipment_id.as_str()),
        ("site", message.site.as_str()),
        ("productType", message.product_type.as_str()),
        ("state", message.state.as_deref().unwrap_or_default()),
    ];
    for (field, value) in labels {
        if value.chars().any(char::is_control) {
            return Err(DomainError::Validation(format!(
                "message {} has control characters in {field}",
                message.id
            )));
        }
    }

    let mut seen = HashSet::new();
    for reading in &message.tags {
        if reading.tag_id.trim().is_empty() {
            return Err(DomainError::Validation(format!(
                "message {} has a reading with an empty tagId",
                message.id
            )));
        }
        if reading.tag_id.chars().any(char::is_control) {
            return Err(DomainError::Validation(format!(
                "message {} has control characters in a tagId",
                message.id
            )));
        }
        if !seen.insert(reading.tag_id.as_str()) {
            return Err(DomainError::Validation(format!(
                "message {} repeats tagId '{}'",
                message.id, reading.tag_id
            )));
        }
        if !reading.value.is_finite() {
            return Err(DomainError::Validation(format!(
                "message {} carries a non-finite value for '{}'",
                message.id, reading.tag_id
            )));
        }
    }

    Ok(())
}
