use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorClass;
use crate::message::TransportMessage;

/// Queue wrapper around a message.
///
/// Only the consumer mutates it, by bumping `retry_count` before a re-enqueue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEnvelope {
    pub message: TransportMessage,
    #[serde(default)]
    pub retry_count: u32,
    pub max_retries: u32,
    pub enqueued_at: DateTime<Utc>,
    pub priority: u8,
}

impl QueueEnvelope {
    pub fn new(message: TransportMessage, max_retries: u32) -> Self {
        Self {
            priority: message.message_type.priority(),
            message,
            retry_count: 0,
            max_retries,
            enqueued_at: Utc::now(),
        }
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Prepares the envelope for its next attempt
    pub fn next_attempt(mut self) -> Self {
        self.retry_count += 1;
        self.enqueued_at = Utc::now();
        self
    }
}

/// Terminal record for a message that could not be delivered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterEntry {
    pub original_queue: String,
    pub error: String,
    pub error_class: ErrorClass,
    /// Parsed envelope or message when the payload was JSON, else the raw string
    pub message: Value,
    pub retry_count: u32,
    pub timestamp: DateTime<Utc>,
}

impl DeadLetterEntry {
    pub fn new(
        original_queue: impl Into<String>,
        error: impl Into<String>,
        error_class: ErrorClass,
        message: Value,
        retry_count: u32,
    ) -> Self {
        Self {
            original_queue: original_queue.into(),
            error: error.into(),
            error_class,
            message,
            retry_count,
            timestamp: Utc::now(),
        }
    }

    /// Keeps the payload structured when it parses, raw otherwise
    pub fn payload_value(raw: &str) -> Value {
        serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
    }
}

/// Maps equipment ids to queue names and back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueNaming {
    prefix: String,
}

impl QueueNaming {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn queue_for(&self, equipment_id: &str) -> String {
        format!("{}{}", self.prefix, equipment_id)
    }

    pub fn equipment_for<'a>(&self, queue: &'a str) -> Option<&'a str> {
        queue.strip_prefix(self.prefix.as_str()).filter(|id| !id.is_empty())
    }
}
