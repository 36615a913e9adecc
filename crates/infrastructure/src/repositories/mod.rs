pub mod equipment_loader;
pub mod registry;
pub mod watcher;

pub use equipment_loader::{DirectorySnapshot, EquipmentLoader};
pub use registry::EquipmentRegistry;
pub use watcher::{EquipmentConfigWatcher, ReloadOutcome};
