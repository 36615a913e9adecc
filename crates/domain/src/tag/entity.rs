use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tag::{TagBehavior, TagDataType, TagId, TagQuality, TagValue};

/// A simulated signal belonging to one piece of equipment.
///
/// `equipment_id` may be omitted in documents; the loader fills it in from
/// the owning equipment and rejects a mismatching value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: TagId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub equipment_id: String,
    pub data_type: TagDataType,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub current_value: Option<TagValue>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub quality: TagQuality,
    pub behavior: TagBehavior,
}

impl Tag {
    pub fn new(
        id: TagId,
        equipment_id: impl Into<String>,
        data_type: TagDataType,
        behavior: TagBehavior,
    ) -> Self {
        Self {
            name: id.to_string(),
            id,
            equipment_id: equipment_id.into(),
            data_type,
            address: String::new(),
            current_value: None,
            last_updated: None,
            quality: TagQuality::default(),
            behavior,
        }
    }

    /// Records the latest reading on the tag
    pub fn record(&mut self, value: TagValue, quality: TagQuality, at: DateTime<Utc>) {
        self.current_value = Some(value);
        self.quality = quality;
        self.last_updated = Some(at);
    }
}
