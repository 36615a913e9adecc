use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::equipment::Equipment;
use crate::error::{DomainError, Result};

/// The validated equipment fleet currently being simulated.
///
/// Swapped as a whole on reload, never edited in place.
#[derive(Debug, Clone, PartialEq)]
pub struct EquipmentSet {
    pub equipment: Vec<Equipment>,
    pub version: u64,
    pub loaded_at: DateTime<Utc>,
}

impl EquipmentSet {
    /// Validates every entry and rejects duplicate ids
    pub fn new(mut equipment: Vec<Equipment>) -> Result<Self> {
        let mut seen = HashSet::new();
        for item in &mut equipment {
            item.validate()?;
            if !seen.insert(item.id.clone()) {
                return Err(DomainError::Configuration(format!(
                    "equipment id '{}' is declared more than once",
                    item.id
                )));
            }
        }
        Ok(Self {
            equipment,
            version: 0,
            loaded_at: Utc::now(),
        })
    }

    pub fn empty() -> Self {
        Self {
            equipment: Vec::new(),
            version: 0,
            loaded_at: Utc::now(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Equipment> {
        self.equipment.iter().find(|e| e.id == id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.equipment.iter().map(|e| e.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.equipment.len()
    }

    pub fn is_empty(&self) -> bool {
        self.equipment.is_empty()
    }
}
