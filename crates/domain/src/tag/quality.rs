use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

/// Tag value quality indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TagQuality {
    /// Value is valid and trustworthy
    Good,
    /// Value is invalid or corrupted
    Bad,
    /// Value quality is uncertain
    Uncertain,
}

impl TagQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Good => "GOOD",
            Self::Bad => "BAD",
            Self::Uncertain => "UNCERTAIN",
        }
    }

    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Good)
    }
}

impl Default for TagQuality {
    fn default() -> Self {
        Self::Uncertain
    }
}

/// Per-reading quality draw.
///
/// GOOD with probability `good_probability`. The remainder splits into
/// UNCERTAIN (`uncertain_share` of it) and BAD.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityModel {
    pub good_probability: f64,
    pub uncertain_share: f64,
}

impl Default for QualityModel {
    fn default() -> Self {
        Self {
            good_probability: 0.999,
            uncertain_share: 0.9,
        }
    }
}

impl QualityModel {
    /// Model that always reports GOOD
    pub fn always_good() -> Self {
        Self {
            good_probability: 1.0,
            uncertain_share: 1.0,
        }
    }

    pub fn draw(&self, rng: &mut dyn RngCore) -> TagQuality {
        let roll: f64 = rng.gen_range(0.0..1.0);
        if roll < self.good_probability {
            return TagQuality::Good;
        }
        let bad_threshold =
            self.good_probability + (1.0 - self.good_probability) * self.uncertain_share;
        if roll < bad_threshold {
            TagQuality::Uncertain
        } else {
            TagQuality::Bad
        }
    }
}
