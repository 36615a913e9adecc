use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::equipment::Equipment;
use crate::tag::{TagQuality, TagValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    DataUpdate,
    StateChange,
    Alarm,
    Heartbeat,
}

impl MessageType {
    /// Queue priority, lower is more urgent
    pub fn priority(&self) -> u8 {
        match self {
            Self::Alarm => 1,
            Self::StateChange => 2,
            Self::DataUpdate => 5,
            Self::Heartbeat => 9,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DataUpdate => "DATA_UPDATE",
            Self::StateChange => "STATE_CHANGE",
            Self::Alarm => "ALARM",
            Self::Heartbeat => "HEARTBEAT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagReading {
    pub tag_id: String,
    pub value: TagValue,
    pub quality: TagQuality,
}

impl TagReading {
    pub fn new(tag_id: impl Into<String>, value: TagValue, quality: TagQuality) -> Self {
        Self {
            tag_id: tag_id.into(),
            value,
            quality,
        }
    }
}

/// One equipment snapshot as it travels through the broker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportMessage {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub equipment_id: String,
    pub site: String,
    pub product_type: String,
    pub line_number: u32,
    pub message_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub tags: Vec<TagReading>,
}

impl TransportMessage {
    pub fn for_equipment(
        equipment: &Equipment,
        message_type: MessageType,
        timestamp: DateTime<Utc>,
        tags: Vec<TagReading>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp,
            equipment_id: equipment.id.clone(),
            site: equipment.site.clone(),
            product_type: equipment.product_type.clone(),
            line_number: equipment.line_number,
            message_type,
            state: Some(equipment.current_state.clone()),
            tags,
        }
    }
}
