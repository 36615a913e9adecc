use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};

/// How a tag's value evolves over simulation time.
///
/// Times are in milliseconds. `slope` is units per millisecond.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TagBehavior {
    Sinusoidal {
        min: f64,
        max: f64,
        period: f64,
        amplitude: f64,
        offset: f64,
    },
    Linear {
        min: f64,
        max: f64,
        slope: f64,
    },
    Random {
        min: f64,
        max: f64,
    },
    Stepped {
        #[serde(alias = "stepValues")]
        values: Vec<f64>,
        #[serde(rename = "stepDuration")]
        step_duration: u64,
    },
    Constant {
        #[serde(alias = "constantValue")]
        value: f64,
    },
}

impl TagBehavior {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Sinusoidal { .. } => "sinusoidal",
            Self::Linear { .. } => "linear",
            Self::Random { .. } => "random",
            Self::Stepped { .. } => "stepped",
            Self::Constant { .. } => "constant",
        }
    }

    /// Checks parameter sanity so generators can stay total
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Sinusoidal {
                min,
                max,
                period,
                amplitude,
                offset,
            } => {
                check_finite(self.kind(), &[*min, *max, *period, *amplitude, *offset])?;
                check_range(self.kind(), *min, *max)?;
                if *period <= 0.0 {
                    return Err(DomainError::Configuration(format!(
                        "sinusoidal period must be positive, got {period}"
                    )));
                }
                Ok(())
            }
            Self::Linear { min, max, slope } => {
                check_finite(self.kind(), &[*min, *max, *slope])?;
                check_range(self.kind(), *min, *max)
            }
            Self::Random { min, max } => {
                check_finite(self.kind(), &[*min, *max])?;
                check_range(self.kind(), *min, *max)
            }
            Self::Stepped {
                values,
                step_duration,
            } => {
                if values.is_empty() {
                    return Err(DomainError::Configuration(
                        "stepped behavior needs at least one value".to_string(),
                    ));
                }
                if *step_duration == 0 {
                    return Err(DomainError::Configuration(
                        "stepped stepDuration must be positive".to_string(),
                    ));
                }
                check_finite(self.kind(), values)
            }
            Self::Constant { value } => check_finite(self.kind(), &[*value]),
        }
    }
}

fn check_finite(kind: &str, values: &[f64]) -> Result<()> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(DomainError::Configuration(format!(
            "{kind} behavior parameters must be finite numbers"
        )))
    }
}

fn check_range(kind: &str, min: f64, max: f64) -> Result<()> {
    if min > max {
        return Err(DomainError::Configuration(format!(
            "{kind} behavior has min {min} greater than max {max}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_sinusoidal() {
        let behavior: TagBehavior = serde_json::from_value(json!({
            "kind": "sinusoidal",
            "min": 320.0, "max": 380.0, "period": 180000.0, "amplitude": 15.0, "offset": 350.0
        }))
        .unwrap();
        assert_eq!(behavior.kind(), "sinusoidal");
        assert!(behavior.validate().is_ok());
    }

    #[test]
    fn test_parse_stepped_with_alias() {
        let behavior: TagBehavior = serde_json::from_value(json!({
            "kind": "stepped", "stepValues": [0, 1, 2], "stepDuration": 1000
        }))
        .unwrap();
        assert_eq!(
            behavior,
            TagBehavior::Stepped {
                values: vec![0.0, 1.0, 2.0],
                step_duration: 1000
            }
        );
    }

    #[test]
    fn test_unknown_kind_rejected_at_parse() {
        let result = serde_json::from_value::<TagBehavior>(json!({"kind": "sawtooth", "min": 0}));
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_parameters() {
        let inverted = TagBehavior::Random { min: 5.0, max: 1.0 };
        assert!(matches!(inverted.validate(), Err(DomainError::Configuration(_))));

        let zero_period = TagBehavior::Sinusoidal {
            min: 0.0,
            max: 1.0,
            period: 0.0,
            amplitude: 1.0,
            offset: 0.0,
        };
        assert!(zero_period.validate().is_err());

        let empty_steps = TagBehavior::Stepped {
            values: vec![],
            step_duration: 10,
        };
        assert!(empty_steps.validate().is_err());

        let nan = TagBehavior::Constant { value: f64::NAN };
        assert!(nan.validate().is_err());
    }
}
