use std::sync::Arc;

use domain::equipment::EquipmentSet;
use tokio::sync::watch;

/// Holds the active equipment set. Readers get cheap `Arc` snapshots and
/// subscribers are woken on every swap.
#[derive(Clone)]
pub struct EquipmentRegistry {
    tx: Arc<watch::Sender<Arc<EquipmentSet>>>,
}

impl EquipmentRegistry {
    pub fn new(mut initial: EquipmentSet) -> Self {
        initial.version = 1;
        let (tx, _rx) = watch::channel(Arc::new(initial));
        Self { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> Arc<EquipmentSet> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<EquipmentSet>> {
        self.tx.subscribe()
    }

    /// Swaps in a new set and returns its version
    pub fn replace(&self, mut set: EquipmentSet) -> u64 {
        let version = self.tx.borrow().version + 1;
        set.version = version;
        self.tx.send_replace(Arc::new(set));
        version
    }
}
