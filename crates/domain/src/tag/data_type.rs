use serde::{Deserialize, Serialize};

use super::TagValue;

/// PLC data type a tag is declared with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TagDataType {
    Bool,
    Int,
    Dint,
    Real,
}

impl TagDataType {
    /// Coerces a generated number into this data type.
    ///
    /// BOOL is `raw >= 0.5`. INT and DINT round and saturate to 16 and 32 bits.
    pub fn coerce(&self, raw: f64) -> TagValue {
        match self {
            Self::Bool => TagValue::Bool(raw >= 0.5),
            Self::Int => TagValue::Int(saturate(raw, i16::MIN as f64, i16::MAX as f64)),
            Self::Dint => TagValue::Int(saturate(raw, i32::MIN as f64, i32::MAX as f64)),
            Self::Real => TagValue::Real(raw),
        }
    }

    /// Brings a configured value (such as a state override) to this data type
    pub fn normalize(&self, value: TagValue) -> TagValue {
        match (self, value) {
            (Self::Bool, TagValue::Bool(_)) => value,
            _ => self.coerce(value.as_f64()),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bool => "BOOL",
            Self::Int => "INT",
            Self::Dint => "DINT",
            Self::Real => "REAL",
        }
    }
}

fn saturate(raw: f64, min: f64, max: f64) -> i64 {
    if raw.is_nan() {
        return 0;
    }
    raw.round().clamp(min, max) as i64
}
