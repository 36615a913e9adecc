use std::sync::Arc;
use std::time::Duration;

use domain::DomainError;
use domain::health::ErrorTracker;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::equipment_loader::{DirectorySnapshot, EquipmentLoader};
use super::registry::EquipmentRegistry;

#[derive(Debug, Clone, PartialEq)]
pub enum ReloadOutcome {
    Unchanged,
    Applied { version: u64, equipment: usize },
    Rejected(DomainError),
}

/// Polls the equipment directory and swaps the registry on change.
/// A set that fails to load leaves the active one in place.
pub struct EquipmentConfigWatcher {
    loader: EquipmentLoader,
    registry: EquipmentRegistry,
    errors: Arc<ErrorTracker>,
    last_snapshot: DirectorySnapshot,
    last_failure: Option<String>,
}

impl EquipmentConfigWatcher {
    /// `initial` is the snapshot the registry's current set was built from
    pub fn new(
        loader: EquipmentLoader,
        registry: EquipmentRegistry,
        errors: Arc<ErrorTracker>,
        initial: DirectorySnapshot,
    ) -> Self {
        Self {
            loader,
            registry,
            errors,
            last_snapshot: initial,
            last_failure: None,
        }
    }

    pub async fn check_once(&mut self) -> ReloadOutcome {
        let snapshot = match self.loader.read_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => return self.reject(e),
        };

        if snapshot == self.last_snapshot {
            return ReloadOutcome::Unchanged;
        }

        info!("🔄 Equipment configuration changed, reloading");
        match EquipmentLoader::parse_snapshot(&snapshot) {
            Ok(set) => {
                let equipment = set.len();
                let version = self.registry.replace(set);
                self.last_snapshot = snapshot;
                self.last_failure = None;
                info!(version, equipment, "✅ Equipment configuration applied");
                ReloadOutcome::Applied { version, equipment }
            }
            Err(e) => {
                // Remember the rejected files so the same error isn't reported every poll
                self.last_snapshot = snapshot;
                self.reject(e)
            }
        }
    }

    fn reject(&mut self, e: DomainError) -> ReloadOutcome {
        let message = e.to_string();
        if self.last_failure.as_deref() != Some(message.as_str()) {
            error!("Equipment reload rejected, keeping previous set: {}", message);
            self.errors.record_error(&e);
            self.last_failure = Some(message);
        }
        ReloadOutcome::Rejected(e)
    }

    pub async fn run(mut self, interval: Duration, cancel: CancellationToken) {
        info!(dir = %self.loader.dir().display(), "👀 Watching equipment configuration");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.check_once().await;
                }
            }
        }
        debug!("Equipment watcher stopped");
    }
}
