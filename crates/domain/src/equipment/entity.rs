use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::equipment::{StateTransition, TransitionCondition};
use crate::error::{DomainError, Result};
use crate::tag::{Tag, TagValue, validate_identifier};

/// A value forced onto a tag while the equipment is in a given state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagOverride {
    pub tag_id: String,
    #[serde(alias = "forcedValue")]
    pub value: TagValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentState {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tag_overrides: Vec<TagOverride>,
    #[serde(default)]
    pub transitions: Vec<StateTransition>,
}

impl EquipmentState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            tag_overrides: Vec::new(),
            transitions: Vec::new(),
        }
    }

    pub fn with_override(mut self, tag_id: impl Into<String>, value: TagValue) -> Self {
        self.tag_overrides.push(TagOverride {
            tag_id: tag_id.into(),
            value,
        });
        self
    }

    pub fn with_transition(mut self, transition: StateTransition) -> Self {
        self.transitions.push(transition);
        self
    }

    pub fn override_for(&self, tag_id: &str) -> Option<TagValue> {
        self.tag_overrides
            .iter()
            .find(|o| o.tag_id == tag_id)
            .map(|o| o.value)
    }
}

/// A simulated machine on a production line.
///
/// Loaded from one JSON document; `validate` must pass before the equipment
/// is handed to a state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Equipment {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub equipment_type: String,
    #[serde(default)]
    pub line_id: String,
    #[serde(default)]
    pub site: String,
    #[serde(default)]
    pub product_type: String,
    #[serde(default)]
    pub line_number: u32,
    #[serde(default)]
    pub tags: Vec<Tag>,
    pub states: Vec<EquipmentState>,
    pub current_state: String,
}

impl Equipment {
    pub fn state(&self, name: &str) -> Option<&EquipmentState> {
        self.states.iter().find(|s| s.name == name)
    }

    pub fn has_state(&self, name: &str) -> bool {
        self.state(name).is_some()
    }

    pub fn tag(&self, tag_id: &str) -> Option<&Tag> {
        self.tags.iter().find(|t| t.id.as_str() == tag_id)
    }

    /// Enforces cross-reference rules and fills in each tag's `equipment_id`.
    pub fn validate(&mut self) -> Result<()> {
        validate_identifier("Equipment ID", &self.id)?;
        let id = self.id.clone();
        let context = move |msg: String| DomainError::Configuration(format!("equipment '{id}': {msg}"));

        // These end up as time-series tag values
        for (field, value) in [
            ("name", &self.name),
            ("type", &self.equipment_type),
            ("lineId", &self.line_id),
            ("site", &self.site),
            ("productType", &self.product_type),
        ] {
            if value.chars().any(char::is_control) {
                return Err(context(format!("{field} contains control characters")));
            }
        }

        let mut tag_ids = HashSet::new();
        for tag in &mut self.tags {
            if tag.equipment_id.is_empty() {
                tag.equipment_id = self.id.clone();
            } else if tag.equipment_id != self.id {
                return Err(context(format!(
                    "tag '{}' declares equipmentId '{}'",
                    tag.id, tag.equipment_id
                )));
            }
            if !tag_ids.insert(tag.id.as_str().to_string()) {
                return Err(context(format!("duplicate tag id '{}'", tag.id)));
            }
            tag.behavior
                .validate()
                .map_err(|e| context(format!("tag '{}': {e}", tag.id)))?;
        }

        if self.states.is_empty() {
            return Err(context("declares no states".to_string()));
        }

        let mut state_names = HashSet::new();
        for state in &self.states {
            if state.name.trim().is_empty() {
                return Err(context("has a state with an empty name".to_string()));
            }
            if state.name.chars().any(char::is_control) {
                return Err(context(format!("state {:?} contains control characters", state.name)));
            }
            if !state_names.insert(state.name.as_str()) {
                return Err(context(format!("duplicate state '{}'", state.name)));
            }
        }

        if !state_names.contains(self.current_state.as_str()) {
            return Err(context(format!(
                "currentState '{}' is not a declared state",
                self.current_state
            )));
        }

        for state in &self.states {
            for o in &state.tag_overrides {
                if !tag_ids.contains(&o.tag_id) {
                    return Err(context(format!(
                        "state '{}' overrides unknown tag '{}'",
                        state.name, o.tag_id
                    )));
                }
                if !o.value.is_finite() {
                    return Err(context(format!(
                        "state '{}' forces a non-finite value on '{}'",
                        state.name, o.tag_id
                    )));
                }
            }
            for t in &state.transitions {
                if !state_names.contains(t.to_state.as_str()) {
                    return Err(context(format!(
                        "state '{}' transitions to undeclared state '{}'",
                        state.name, t.to_state
                    )));
                }
                if let TransitionCondition::ThresholdOnTag { tag_id, .. } = &t.condition {
                    if !tag_ids.contains(tag_id) {
                        return Err(context(format!(
                            "state '{}' thresholds on unknown tag '{tag_id}'",
                            state.name
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}
