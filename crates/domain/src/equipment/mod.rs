mod entity;
mod set;
mod state_machine;
mod transition;

pub use entity::{Equipment, EquipmentState, TagOverride};
pub use set::EquipmentSet;
pub use state_machine::{EquipmentStateMachine, StateChange, TickOutcome};
pub use transition::{Operator, StateTransition, TransitionCondition};
