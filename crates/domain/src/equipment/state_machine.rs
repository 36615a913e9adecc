use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rand::{Rng, RngCore};

use crate::equipment::{Equipment, StateTransition, TransitionCondition};
use crate::error::{DomainError, Result};
use crate::message::TagReading;
use crate::tag::{GeneratorFactory, QualityModel, TagQuality, TagValueGenerator};

/// A transition taken during a tick
#[derive(Debug, Clone, PartialEq)]
pub struct StateChange {
    pub from: String,
    pub to: String,
    pub at_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    pub readings: Vec<TagReading>,
    pub transition: Option<StateChange>,
}

impl TickOutcome {
    pub fn has_bad_quality(&self) -> bool {
        self.readings.iter().any(|r| r.quality == TagQuality::Bad)
    }
}

/// Runtime of one piece of equipment: its current state, generators and
/// pending manual requests.
///
/// Time is supplied by the caller as milliseconds since simulation start,
/// randomness through the `rng` passed to `tick`.
#[derive(Debug)]
pub struct EquipmentStateMachine {
    equipment: Equipment,
    generators: Vec<Box<dyn TagValueGenerator>>,
    current: usize,
    entered_at_ms: u64,
    pending_manual: HashSet<String>,
    quality: QualityModel,
}

impl EquipmentStateMachine {
    pub fn new(mut equipment: Equipment, now_ms: u64) -> Result<Self> {
        equipment.validate()?;
        let current = equipment
            .states
            .iter()
            .position(|s| s.name == equipment.current_state)
            .ok_or_else(|| {
                DomainError::Configuration(format!(
                    "equipment '{}' starts in undeclared state '{}'",
                    equipment.id, equipment.current_state
                ))
            })?;
        let generators = equipment
            .tags
            .iter()
            .map(|t| GeneratorFactory::create(&t.behavior))
            .collect();

        Ok(Self {
            equipment,
            generators,
            current,
            entered_at_ms: now_ms,
            pending_manual: HashSet::new(),
            quality: QualityModel::default(),
        })
    }

    pub fn with_quality_model(mut self, quality: QualityModel) -> Self {
        self.quality = quality;
        self
    }

    pub fn id(&self) -> &str {
        &self.equipment.id
    }

    /// Equipment definition with runtime fields (tag readings, current state) kept current
    pub fn equipment(&self) -> &Equipment {
        &self.equipment
    }

    pub fn current_state(&self) -> &str {
        &self.equipment.states[self.current].name
    }

    pub fn entered_at_ms(&self) -> u64 {
        self.entered_at_ms
    }

    /// Queues a manual transition to `to_state`.
    ///
    /// It fires on the first tick where the matching manual transition of the
    /// current state has its delay satisfied. Any transition clears the queue.
    pub fn request_manual(&mut self, to_state: &str) -> Result<()> {
        let state = &self.equipment.states[self.current];
        let declared = state
            .transitions
            .iter()
            .any(|t| t.is_manual() && t.to_state == to_state);
        if !declared {
            return Err(DomainError::Validation(format!(
                "equipment '{}' has no manual transition from '{}' to '{}'",
                self.equipment.id, state.name, to_state
            )));
        }
        self.pending_manual.insert(to_state.to_string());
        Ok(())
    }

    /// Carries the runtime state over from the machine this one replaces.
    /// Returns false when the previous state no longer exists here.
    pub fn resume_from(&mut self, previous: &EquipmentStateMachine) -> bool {
        let Some(index) = self
            .equipment
            .states
            .iter()
            .position(|s| s.name == previous.current_state())
        else {
            return false;
        };
        self.current = index;
        self.entered_at_ms = previous.entered_at_ms;
        self.equipment.current_state = self.equipment.states[index].name.clone();
        for tag in &mut self.equipment.tags {
            if let Some(old) = previous.equipment.tag(tag.id.as_str()) {
                tag.current_value = old.current_value;
                tag.last_updated = old.last_updated;
                tag.quality = old.quality;
            }
        }
        true
    }

    pub fn tick(
        &mut self,
        now_ms: u64,
        timestamp: DateTime<Utc>,
        rng: &mut dyn RngCore,
    ) -> TickOutcome {
        let readings = self.sample_tags(now_ms, timestamp, rng);
        let transition = self.evaluate_transitions(now_ms, &readings, rng);
        TickOutcome {
            readings,
            transition,
        }
    }

    fn sample_tags(
        &mut self,
        now_ms: u64,
        timestamp: DateTime<Utc>,
        rng: &mut dyn RngCore,
    ) -> Vec<TagReading> {
        let state = &self.equipment.states[self.current];
        let mut readings = Vec::with_capacity(self.equipment.tags.len());

        for (tag, generator) in self.equipment.tags.iter_mut().zip(&self.generators) {
            let raw = generator.generate(now_ms, rng);
            let value = match state.override_for(tag.id.as_str()) {
                Some(forced) => tag.data_type.normalize(forced),
                None => tag.data_type.coerce(raw),
            };
            let quality = self.quality.draw(rng);
            tag.record(value, quality, timestamp);
            readings.push(TagReading::new(tag.id.as_str(), value, quality));
        }

        readings
    }

    fn evaluate_transitions(
        &mut self,
        now_ms: u64,
        readings: &[TagReading],
        rng: &mut dyn RngCore,
    ) -> Option<StateChange> {
        let in_state_ms = now_ms.saturating_sub(self.entered_at_ms);
        let state = &self.equipment.states[self.current];

        let taken = state
            .transitions
            .iter()
            .find(|t| {
                Self::transition_passes(t, in_state_ms, readings, &self.pending_manual, rng)
            })?
            .to_state
            .clone();

        let from = state.name.clone();
        let index = self.equipment.states.iter().position(|s| s.name == taken)?;
        self.current = index;
        self.entered_at_ms = now_ms;
        self.equipment.current_state = taken.clone();
        self.pending_manual.clear();

        Some(StateChange {
            from,
            to: taken,
            at_ms: now_ms,
        })
    }

    fn transition_passes(
        transition: &StateTransition,
        in_state_ms: u64,
        readings: &[TagReading],
        pending_manual: &HashSet<String>,
        rng: &mut dyn RngCore,
    ) -> bool {
        if transition.delay_ms.is_some_and(|delay| in_state_ms < delay) {
            return false;
        }

        let holds = match &transition.condition {
            TransitionCondition::Always => true,
            TransitionCondition::Probability(p) => rng.gen_range(0.0..1.0) < *p,
            TransitionCondition::ThresholdOnTag { tag_id, op, value } => readings
                .iter()
                .find(|r| &r.tag_id == tag_id)
                .is_some_and(|r| op.apply(r.value.as_f64(), *value)),
            TransitionCondition::ManualTrigger => pending_manual.contains(&transition.to_state),
        };

        holds
            && transition
                .probability
                .is_none_or(|p| rng.gen_range(0.0..1.0) < p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equipment::{EquipmentState, Operator};
    use crate::tag::{Tag, TagBehavior, TagDataType, TagId, TagValue};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn tag(id: &str, data_type: TagDataType, behavior: TagBehavior) -> Tag {
        Tag::new(TagId::new(id).unwrap(), "", data_type, behavior)
    }

    fn equipment(states: Vec<EquipmentState>, current: &str) -> Equipment {
        Equipment {
            id: "press1".to_string(),
            name: "Press 1".to_string(),
            equipment_type: "press".to_string(),
            line_id: "line1".to_string(),
            site: "plant-a".to_string(),
            product_type: "brackets".to_string(),
            line_number: 1,
            tags: vec![
                tag(
                    "speed",
                    TagDataType::Real,
                    TagBehavior::Linear {
                        min: 0.0,
                        max: 100.0,
                        slope: 0.01,
                    },
                ),
                tag(
                    "running",
                    TagDataType::Bool,
                    TagBehavior::Constant { value: 1.0 },
                ),
            ],
            states,
            current_state: current.to_string(),
        }
    }

    fn machine(states: Vec<EquipmentState>, current: &str) -> EquipmentStateMachine {
        EquipmentStateMachine::new(equipment(states, current), 0)
            .unwrap()
            .with_quality_model(QualityModel::always_good())
    }

    #[test]
    fn test_override_always_wins() {
        let mut sm = machine(
            vec![
                EquipmentState::new("STOPPED")
                    .with_override("speed", TagValue::Real(0.0))
                    .with_override("running", TagValue::Int(0)),
            ],
            "STOPPED",
        );
        let mut rng = StdRng::seed_from_u64(1);

        for t in [0, 1_000, 5_000, 9_000] {
            let outcome = sm.tick(t, Utc::now(), &mut rng);
            assert_eq!(outcome.readings[0].value, TagValue::Real(0.0));
            assert_eq!(outcome.readings[1].value, TagValue::Bool(false));
        }
    }

    #[test]
    fn test_generated_values_follow_behavior() {
        let mut sm = machine(vec![EquipmentState::new("RUNNING")], "RUNNING");
        let mut rng = StdRng::seed_from_u64(2);
        let outcome = sm.tick(1_000, Utc::now(), &mut rng);
        assert_eq!(outcome.readings[0].value, TagValue::Real(10.0));
        assert_eq!(outcome.readings[1].value, TagValue::Bool(true));
        assert_eq!(
            sm.equipment().tag("speed").unwrap().current_value,
            Some(TagValue::Real(10.0))
        );
    }

    #[test]
    fn test_delay_never_fires_early() {
        let delay = 5_000;
        for seed in 0..50 {
            let mut sm = machine(
                vec![
                    EquipmentState::new("A").with_transition(
                        StateTransition::new("B", TransitionCondition::Probability(0.5))
                            .with_delay(delay),
                    ),
                    EquipmentState::new("B"),
                ],
                "A",
            );
            let mut rng = StdRng::seed_from_u64(seed);
            let mut fired_at = None;
            for t in (0..20_000).step_by(100) {
                if let Some(change) = sm.tick(t, Utc::now(), &mut rng).transition {
                    fired_at = Some(change.at_ms);
                    break;
                }
            }
            let at = fired_at.expect("transition should eventually fire");
            assert!(at >= delay, "fired at {at} before delay {delay}");
        }
    }

    #[test]
    fn test_first_matching_transition_wins_and_resets_entry_time() {
        let mut sm = machine(
            vec![
                EquipmentState::new("A")
                    .with_transition(StateTransition::new("B", TransitionCondition::Always))
                    .with_transition(StateTransition::new("C", TransitionCondition::Always)),
                EquipmentState::new("B").with_transition(
                    StateTransition::new("A", TransitionCondition::Always).with_delay(1_000),
                ),
                EquipmentState::new("C"),
            ],
            "A",
        );
        let mut rng = StdRng::seed_from_u64(3);

        let change = sm.tick(500, Utc::now(), &mut rng).transition.unwrap();
        assert_eq!(change.from, "A");
        assert_eq!(change.to, "B");
        assert_eq!(sm.current_state(), "B");
        assert_eq!(sm.entered_at_ms(), 500);
        assert_eq!(sm.equipment().current_state, "B");

        assert!(sm.tick(1_400, Utc::now(), &mut rng).transition.is_none());
        assert!(sm.tick(1_500, Utc::now(), &mut rng).transition.is_some());
        assert_eq!(sm.current_state(), "A");
    }

    #[test]
    fn test_threshold_uses_current_readings() {
        let mut sm = machine(
            vec![
                EquipmentState::new("RUNNING").with_transition(StateTransition::new(
                    "OVERSPEED",
                    TransitionCondition::ThresholdOnTag {
                        tag_id: "speed".to_string(),
                        op: Operator::GreaterOrEqual,
                        value: 50.0,
                    },
                )),
                EquipmentState::new("OVERSPEED"),
            ],
            "RUNNING",
        );
        let mut rng = StdRng::seed_from_u64(4);

        assert!(sm.tick(4_000, Utc::now(), &mut rng).transition.is_none());
        let change = sm.tick(5_000, Utc::now(), &mut rng).transition.unwrap();
        assert_eq!(change.to, "OVERSPEED");
    }

    #[test]
    fn test_manual_trigger_is_consumed() {
        let mut sm = machine(
            vec![
                EquipmentState::new("RUNNING").with_transition(StateTransition::new(
                    "MAINTENANCE",
                    TransitionCondition::ManualTrigger,
                )),
                EquipmentState::new("MAINTENANCE").with_transition(StateTransition::new(
                    "RUNNING",
                    TransitionCondition::ManualTrigger,
                )),
            ],
            "RUNNING",
        );
        let mut rng = StdRng::seed_from_u64(5);

        assert!(sm.tick(0, Utc::now(), &mut rng).transition.is_none());
        assert!(sm.request_manual("RUNNING").is_err());
        sm.request_manual("MAINTENANCE").unwrap();
        assert_eq!(
            sm.tick(100, Utc::now(), &mut rng).transition.unwrap().to,
            "MAINTENANCE"
        );
        assert!(sm.tick(200, Utc::now(), &mut rng).transition.is_none());
    }

    #[test]
    fn test_probability_gate() {
        let mut never = machine(
            vec![
                EquipmentState::new("A").with_transition(
                    StateTransition::new("B", TransitionCondition::Always).with_probability(0.0),
                ),
                EquipmentState::new("B"),
            ],
            "A",
        );
        let mut rng = StdRng::seed_from_u64(6);
        for t in 0..1_000 {
            assert!(never.tick(t, Utc::now(), &mut rng).transition.is_none());
        }
    }

    #[test]
    fn test_resume_from_previous_machine() {
        let states = vec![
            EquipmentState::new("A")
                .with_transition(StateTransition::new("B", TransitionCondition::Always)),
            EquipmentState::new("B"),
        ];
        let mut old = machine(states.clone(), "A");
        let mut rng = StdRng::seed_from_u64(7);
        old.tick(2_000, Utc::now(), &mut rng);
        assert_eq!(old.current_state(), "B");

        let mut replacement = machine(states, "A");
        assert!(replacement.resume_from(&old));
        assert_eq!(replacement.current_state(), "B");
        assert_eq!(replacement.entered_at_ms(), 2_000);

        let mut reshaped = machine(vec![EquipmentState::new("A")], "A");
        assert!(!reshaped.resume_from(&old));
        assert_eq!(reshaped.current_state(), "A");
    }

    #[test]
    fn test_invalid_equipment_rejected() {
        let result = EquipmentStateMachine::new(equipment(vec![EquipmentState::new("A")], "Z"), 0);
        assert!(matches!(result, Err(DomainError::Configuration(_))));
    }
}
