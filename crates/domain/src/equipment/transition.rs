use serde::{Deserialize, Serialize};

use crate::error::DomainError;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub enum Operator {
    #[serde(alias = "==")]
    Equal,
    #[serde(alias = "<=")]
    LessOrEqual,
    #[serde(alias = ">=")]
    GreaterOrEqual,
    #[serde(alias = "!=")]
    NotEqual,
    #[serde(alias = "<")]
    Less,
    #[serde(alias = ">")]
    Greater,
}

impl Operator {
    pub fn apply(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            Operator::Equal => (lhs - rhs).abs() < f64::EPSILON,
            Operator::NotEqual => (lhs - rhs).abs() >= f64::EPSILON,
            Operator::LessOrEqual => lhs <= rhs,
            Operator::GreaterOrEqual => lhs >= rhs,
            Operator::Greater => lhs > rhs,
            Operator::Less => lhs < rhs,
        }
    }
}

/// Guard of a state transition, resolved when the document is loaded
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionCondition {
    Always,
    Probability(f64),
    ThresholdOnTag {
        tag_id: String,
        op: Operator,
        value: f64,
    },
    ManualTrigger,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TransitionDocument", into = "TransitionDocument")]
pub struct StateTransition {
    pub to_state: String,
    pub condition: TransitionCondition,
    /// Extra gate drawn after the condition holds
    pub probability: Option<f64>,
    pub delay_ms: Option<u64>,
}

impl StateTransition {
    pub fn new(to_state: impl Into<String>, condition: TransitionCondition) -> Self {
        Self {
            to_state: to_state.into(),
            condition,
            probability: None,
            delay_ms: None,
        }
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = Some(delay_ms);
        self
    }

    pub fn with_probability(mut self, probability: f64) -> Self {
        self.probability = Some(probability);
        self
    }

    pub fn is_manual(&self) -> bool {
        matches!(self.condition, TransitionCondition::ManualTrigger)
    }
}

// --- Document form ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransitionDocument {
    to_state: String,
    #[serde(default = "default_condition")]
    condition: ConditionDocument,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    probability: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum ConditionDocument {
    Shorthand(String),
    Structured(StructuredCondition),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum StructuredCondition {
    Always,
    Probability {
        p: f64,
    },
    Threshold {
        #[serde(rename = "tagId")]
        tag_id: String,
        op: Operator,
        value: f64,
    },
    Manual,
}

fn default_condition() -> ConditionDocument {
    ConditionDocument::Shorthand("always".to_string())
}

fn check_probability(p: f64) -> Result<f64, DomainError> {
    if (0.0..=1.0).contains(&p) {
        Ok(p)
    } else {
        Err(DomainError::Configuration(format!(
            "probability must be within [0, 1], got {p}"
        )))
    }
}

impl TryFrom<TransitionDocument> for StateTransition {
    type Error = DomainError;

    fn try_from(doc: TransitionDocument) -> Result<Self, Self::Error> {
        if doc.to_state.trim().is_empty() {
            return Err(DomainError::Configuration(
                "transition toState cannot be empty".to_string(),
            ));
        }

        let mut probability = doc.probability.map(check_probability).transpose()?;

        let condition = match doc.condition {
            ConditionDocument::Shorthand(name) => match name.trim().to_ascii_lowercase().as_str()
            {
                "always" => TransitionCondition::Always,
                "manual" => TransitionCondition::ManualTrigger,
                "probability" => {
                    let p = probability.take().ok_or_else(|| {
                        DomainError::Configuration(format!(
                            "transition to '{}' uses condition 'probability' without a probability",
                            doc.to_state
                        ))
                    })?;
                    TransitionCondition::Probability(p)
                }
                other => {
                    return Err(DomainError::Configuration(format!(
                        "unrecognized transition condition '{other}' for transition to '{}'",
                        doc.to_state
                    )));
                }
            },
            ConditionDocument::Structured(StructuredCondition::Always) => {
                TransitionCondition::Always
            }
            ConditionDocument::Structured(StructuredCondition::Manual) => {
                TransitionCondition::ManualTrigger
            }
            ConditionDocument::Structured(StructuredCondition::Probability { p }) => {
                TransitionCondition::Probability(check_probability(p)?)
            }
            ConditionDocument::Structured(StructuredCondition::Threshold { tag_id, op, value }) => {
                if !value.is_finite() {
                    return Err(DomainError::Configuration(format!(
                        "threshold on '{tag_id}' must compare against a finite number"
                    )));
                }
                TransitionCondition::ThresholdOnTag { tag_id, op, value }
            }
        };

        Ok(Self {
            to_state: doc.to_state,
            condition,
            probability,
            delay_ms: doc.delay_ms,
        })
    }
}

impl From<StateTransition> for TransitionDocument {
    fn from(transition: StateTransition) -> Self {
        let condition = match transition.condition {
            TransitionCondition::Always => ConditionDocument::Shorthand("always".to_string()),
            TransitionCondition::ManualTrigger => {
                ConditionDocument::Shorthand("manual".to_string())
            }
            TransitionCondition::Probability(p) => {
                ConditionDocument::Structured(StructuredCondition::Probability { p })
            }
            TransitionCondition::ThresholdOnTag { tag_id, op, value } => {
                ConditionDocument::Structured(StructuredCondition::Threshold { tag_id, op, value })
            }
        };
        Self {
            to_state: transition.to_state,
            condition,
            probability: transition.probability,
            delay_ms: transition.delay_ms,
        }
    }
}
