use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::TransportMessage;
use crate::tag::TagValue;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
}

impl FieldValue {
    /// Field key for this kind of value.
    ///
    /// InfluxDB fixes a field's type per measurement, so each kind gets its own key.
    pub fn field_key(&self) -> &'static str {
        match self {
            Self::Boolean(_) => "value_bool",
            Self::Integer(_) => "value_int",
            Self::Float(_) => "value_float",
        }
    }
}

impl From<TagValue> for FieldValue {
    fn from(value: TagValue) -> Self {
        match value {
            TagValue::Bool(b) => Self::Boolean(b),
            TagValue::Int(i) => Self::Integer(i),
            TagValue::Real(r) => Self::Float(r),
        }
    }
}

/// One time-series point, derived from a single tag reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageRecord {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, FieldValue>,
    pub timestamp: DateTime<Utc>,
}

impl StorageRecord {
    /// One record per tag reading. Heartbeats carry no readings and yield none.
    pub fn from_message(measurement: &str, message: &TransportMessage) -> Vec<StorageRecord> {
        let mut common = BTreeMap::new();
        common.insert("equipment_id".to_string(), message.equipment_id.clone());
        common.insert("site".to_string(), message.site.clone());
        common.insert("product_type".to_string(), message.product_type.clone());
        common.insert("line_number".to_string(), message.line_number.to_string());
        common.insert(
            "message_type".to_string(),
            message.message_type.as_str().to_string(),
        );
        if let Some(state) = &message.state {
            common.insert("state".to_string(), state.clone());
        }

        message
            .tags
            .iter()
            .map(|reading| {
                let mut tags = common.clone();
                tags.insert("tag_id".to_string(), reading.tag_id.clone());
                tags.insert("quality".to_string(), reading.quality.as_str().to_string());

                let value = FieldValue::from(reading.value);
                let mut fields = BTreeMap::new();
                fields.insert(value.field_key().to_string(), value);

                StorageRecord {
                    measurement: measurement.to_string(),
                    tags,
                    fields,
                    timestamp: message.timestamp,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MessageType, TagReading};
    use crate::tag::TagQuality;

    fn message() -> TransportMessage {
        TransportMessage {
            id: "m-1".to_string(),
            timestamp: "2024-05-01T10:00:00Z".parse().unwrap(),
            equipment_id: "oven1".to_string(),
            site: "plant-a".to_string(),
            product_type: "panels".to_string(),
            line_number: 3,
            message_type: MessageType::Alarm,
            state: Some("RUNNING".to_string()),
            tags: vec![
                TagReading::new("temperature", TagValue::Real(351.2), TagQuality::Bad),
                TagReading::new("door_open", TagValue::Bool(false), TagQuality::Good),
            ],
        }
    }

    #[test]
    fn test_one_record_per_reading() {
        let records = StorageRecord::from_message("equipment_telemetry", &message());
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.measurement, "equipment_telemetry");
        assert_eq!(first.tags["equipment_id"], "oven1");
        assert_eq!(first.tags["tag_id"], "temperature");
        assert_eq!(first.tags["quality"], "BAD");
        assert_eq!(first.tags["line_number"], "3");
        assert_eq!(first.tags["message_type"], "ALARM");
        assert_eq!(first.tags["state"], "RUNNING");
        assert_eq!(first.fields["value_float"], FieldValue::Float(351.2));
        assert_eq!(first.timestamp, message().timestamp);

        assert_eq!(records[1].fields["value_bool"], FieldValue::Boolean(false));
    }

    #[test]
    fn test_each_field_key_holds_one_type() {
        let mut msg = message();
        msg.tags = vec![
            TagReading::new("running", TagValue::Bool(true), TagQuality::Good),
            TagReading::new("strokes", TagValue::Int(42), TagQuality::Good),
            TagReading::new("hydraulicPressure", TagValue::Real(1900.5), TagQuality::Good),
            TagReading::new("spare", TagValue::Int(7), TagQuality::Good),
        ];

        let mut kinds: BTreeMap<String, std::mem::Discriminant<FieldValue>> = BTreeMap::new();
        for record in StorageRecord::from_message("equipment_telemetry", &msg) {
            assert_eq!(record.fields.len(), 1);
            for (key, value) in &record.fields {
                let kind = std::mem::discriminant(value);
                assert_eq!(*kinds.entry(key.clone()).or_insert(kind), kind, "key {key}");
            }
        }
        assert_eq!(kinds.len(), 3);
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let msg = message();
        assert_eq!(
            StorageRecord::from_message("m", &msg),
            StorageRecord::from_message("m", &msg)
        );
    }

    #[test]
    fn test_heartbeat_yields_no_records() {
        let mut msg = message();
        msg.message_type = MessageType::Heartbeat;
        msg.tags.clear();
        assert!(StorageRecord::from_message("m", &msg).is_empty());
    }
}
