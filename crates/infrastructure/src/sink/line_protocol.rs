use std::fmt::Write;

use domain::message::{FieldValue, StorageRecord};

/// Renders records as InfluxDB line protocol with millisecond timestamps.
///
/// Tags with empty values are omitted; the protocol does not allow them.
pub fn encode_batch(records: &[StorageRecord]) -> String {
    let mut body = String::with_capacity(records.len() * 160);
    for (i, record) in records.iter().enumerate() {
        if i > 0 {
            body.push('\n');
        }
        encode_record(&mut body, record);
    }
    body
}

fn encode_record(out: &mut String, record: &StorageRecord) {
    escape_into(out, &record.measurement, &[',', ' ']);

    for (key, value) in &record.tags {
        if value.is_empty() {
            continue;
        }
        out.push(',');
        escape_into(out, key, &[',', '=', ' ']);
        out.push('=');
        escape_into(out, value, &[',', '=', ' ']);
    }

    out.push(' ');
    for (i, (key, value)) in record.fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        escape_into(out, key, &[',', '=', ' ']);
        out.push('=');
        match value {
            FieldValue::Float(v) => {
                let _ = write!(out, "{v}");
            }
            FieldValue::Integer(v) => {
                let _ = write!(out, "{v}i");
            }
            FieldValue::Boolean(v) => {
                let _ = write!(out, "{v}");
            }
        }
    }

    let _ = write!(out, " {}", record.timestamp.timestamp_millis());
}

// Control characters have no escape in line protocol and are dropped
fn escape_into(out: &mut String, raw: &str, special: &[char]) {
    for c in raw.chars() {
        if c.is_control() {
            continue;
        }
        if c == '\\' || special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
}
