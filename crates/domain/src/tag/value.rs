use serde::{Deserialize, Serialize};

/// A typed tag reading.
///
/// Serialized untagged so the wire carries plain JSON booleans and numbers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    Bool(bool),
    Int(i64),
    Real(f64),
}

impl TagValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Int(i) => *i as f64,
            Self::Real(r) => *r,
        }
    }

    /// NaN and infinities cannot be stored downstream
    pub fn is_finite(&self) -> bool {
        match self {
            Self::Real(r) => r.is_finite(),
            _ => true,
        }
    }
}

impl std::fmt::Display for TagValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Real(r) => write!(f, "{r}"),
        }
    }
}
