pub mod clock;
pub mod engine;
pub mod publish_pump;
pub mod stats;

pub use clock::SimulationClock;
pub use engine::{Simulator, SimulatorCommand, SimulatorHandle};
pub use publish_pump::spawn_publish_pump;
pub use stats::{EquipmentStatus, SimulatorSnapshot, SimulatorStats};
