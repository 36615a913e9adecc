use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use domain::Equipment;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentStatus {
    pub equipment_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub equipment_type: String,
    pub state: String,
    pub last_update: Option<DateTime<Utc>>,
    pub messages: u64,
    pub transitions: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatorSnapshot {
    pub messages_produced: u64,
    pub transitions: u64,
    pub heartbeats: u64,
    /// Messages lost because the publish channel was full
    pub dropped: u64,
    pub equipment: usize,
}

/// Counters written by the simulator task and read by diagnostics
#[derive(Debug, Default)]
pub struct SimulatorStats {
    messages_produced: AtomicU64,
    transitions: AtomicU64,
    heartbeats: AtomicU64,
    dropped: AtomicU64,
    equipment: DashMap<String, EquipmentStatus>,
}

impl SimulatorStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks exactly the given equipment, keeping counters of those already known
    pub(crate) fn sync_equipment<'a>(&self, equipment: impl IntoIterator<Item = &'a Equipment>) {
        let mut active = HashSet::new();
        for item in equipment {
            active.insert(item.id.clone());
            self.equipment
                .entry(item.id.clone())
                .and_modify(|status| {
                    status.name = item.name.clone();
                    status.equipment_type = item.equipment_type.clone();
                    status.state = item.current_state.clone();
                })
                .or_insert_with(|| EquipmentStatus {
                    equipment_id: item.id.clone(),
                    name: item.name.clone(),
                    equipment_type: item.equipment_type.clone(),
                    state: item.current_state.clone(),
                    last_update: None,
                    messages: 0,
                    transitions: 0,
                });
        }
        self.equipment.retain(|id, _| active.contains(id));
    }

    pub(crate) fn record_message(&self, equipment_id: &str, state: &str, at: DateTime<Utc>) {
        self.messages_produced.fetch_add(1, Ordering::Relaxed);
        if let Some(mut status) = self.equipment.get_mut(equipment_id) {
            status.messages += 1;
            status.state = state.to_string();
            status.last_update = Some(at);
        }
    }

    pub(crate) fn record_transition(&self, equipment_id: &str) {
        self.transitions.fetch_add(1, Ordering::Relaxed);
        if let Some(mut status) = self.equipment.get_mut(equipment_id) {
            status.transitions += 1;
        }
    }

    pub(crate) fn record_heartbeat(&self) {
        self.heartbeats.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SimulatorSnapshot {
        SimulatorSnapshot {
            messages_produced: self.messages_produced.load(Ordering::Relaxed),
            transitions: self.transitions.load(Ordering::Relaxed),
            heartbeats: self.heartbeats.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            equipment: self.equipment.len(),
        }
    }

    /// Per-equipment status sorted by id
    pub fn equipment(&self) -> Vec<EquipmentStatus> {
        let mut all: Vec<EquipmentStatus> =
            self.equipment.iter().map(|entry| entry.value().clone()).collect();
        all.sort_by(|a, b| a.equipment_id.cmp(&b.equipment_id));
        all
    }

    pub fn equipment_status(&self, equipment_id: &str) -> Option<EquipmentStatus> {
        self.equipment.get(equipment_id).map(|entry| entry.value().clone())
    }
}
