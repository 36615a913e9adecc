use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use domain::equipment::{EquipmentSet, EquipmentStateMachine};
use domain::message::{MessageType, TransportMessage};
use domain::DomainError;
use infrastructure::config::SimulatorConfig;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::simulator::clock::SimulationClock;
use crate::simulator::stats::{EquipmentStatus, SimulatorSnapshot, SimulatorStats};

const COMMAND_CHANNEL_CAPACITY: usize = 32;

pub enum SimulatorCommand {
    /// Queue a manual transition for one equipment
    Trigger {
        equipment_id: String,
        to_state: String,
        reply: oneshot::Sender<Result<(), DomainError>>,
    },
}

/// Cloneable access to a running simulator
#[derive(Clone)]
pub struct SimulatorHandle {
    commands: mpsc::Sender<SimulatorCommand>,
    stats: Arc<SimulatorStats>,
}

impl SimulatorHandle {
    pub async fn trigger(&self, equipment_id: &str, to_state: &str) -> Result<(), DomainError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(SimulatorCommand::Trigger {
                equipment_id: equipment_id.to_string(),
                to_state: to_state.to_string(),
                reply,
            })
            .await
            .map_err(|_| DomainError::Transport("simulator is not running".to_string()))?;
        rx.await
            .map_err(|_| DomainError::Transport("simulator stopped before answering".to_string()))?
    }

    pub fn snapshot(&self) -> SimulatorSnapshot {
        self.stats.snapshot()
    }

    pub fn equipment(&self) -> Vec<EquipmentStatus> {
        self.stats.equipment()
    }

    pub fn equipment_status(&self, equipment_id: &str) -> Option<EquipmentStatus> {
        self.stats.equipment_status(equipment_id)
    }
}

/// Drives every equipment state machine from one timer and hands the
/// resulting messages to the publish channel without ever awaiting it.
pub struct Simulator {
    config: SimulatorConfig,
    equipment: watch::Receiver<Arc<EquipmentSet>>,
    machines: BTreeMap<String, EquipmentStateMachine>,
    rng: StdRng,
    clock: SimulationClock,
    out: mpsc::Sender<TransportMessage>,
    commands: mpsc::Receiver<SimulatorCommand>,
    stats: Arc<SimulatorStats>,
}

impl Simulator {
    pub fn new(
        config: SimulatorConfig,
        mut equipment: watch::Receiver<Arc<EquipmentSet>>,
        out: mpsc::Sender<TransportMessage>,
    ) -> (Self, SimulatorHandle) {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let (commands_tx, commands) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let stats = Arc::new(SimulatorStats::new());
        let initial = equipment.borrow_and_update().clone();

        let mut simulator = Self {
            config,
            equipment,
            machines: BTreeMap::new(),
            rng,
            clock: SimulationClock::start(),
            out,
            commands,
            stats: stats.clone(),
        };
        simulator.apply_set(&initial);

        let handle = SimulatorHandle {
            commands: commands_tx,
            stats,
        };
        (simulator, handle)
    }

    pub fn machine(&self, equipment_id: &str) -> Option<&EquipmentStateMachine> {
        self.machines.get(equipment_id)
    }

    /// Replaces the simulated fleet. Equipment that survives the swap and
    /// still declares its current state keeps running from where it was.
    pub fn apply_set(&mut self, set: &EquipmentSet) {
        let now_ms = self.clock.elapsed_ms();
        let mut next = BTreeMap::new();

        for equipment in &set.equipment {
            let mut machine = match EquipmentStateMachine::new(equipment.clone(), now_ms) {
                Ok(machine) => machine,
                Err(e) => {
                    error!(equipment_id = %equipment.id, "Cannot simulate equipment: {}", e);
                    continue;
                }
            };
            if let Some(previous) = self.machines.get(&equipment.id) {
                if !machine.resume_from(previous) {
                    info!(
                        equipment_id = %equipment.id,
                        state = %machine.current_state(),
                        "Previous state no longer declared, restarting"
                    );
                }
            }
            next.insert(equipment.id.clone(), machine);
        }

        self.machines = next;
        self.stats
            .sync_equipment(self.machines.values().map(|m| m.equipment()));
        info!(
            version = set.version,
            equipment = self.machines.len(),
            "✅ Simulating equipment set"
        );
    }

    /// Advances every machine once. Returns how many messages reached the channel.
    pub fn tick_once(&mut self) -> usize {
        let now_ms = self.clock.elapsed_ms();
        let timestamp = Utc::now();
        let mut sent = 0;

        for machine in self.machines.values_mut() {
            let outcome = machine.tick(now_ms, timestamp, &mut self.rng);

            let message_type = if let Some(change) = &outcome.transition {
                info!(
                    equipment_id = %machine.id(),
                    from = %change.from,
                    to = %change.to,
                    "🔀 State transition"
                );
                self.stats.record_transition(machine.id());
                MessageType::StateChange
            } else if outcome.has_bad_quality() {
                MessageType::Alarm
            } else {
                MessageType::DataUpdate
            };

            let message = TransportMessage::for_equipment(
                machine.equipment(),
                message_type,
                timestamp,
                outcome.readings,
            );
            self.stats
                .record_message(machine.id(), machine.current_state(), timestamp);
            if Self::emit(&self.out, &self.stats, message) {
                sent += 1;
            }
        }

        sent
    }

    /// One HEARTBEAT per equipment, without readings
    pub fn emit_heartbeats(&self) -> usize {
        let timestamp = Utc::now();
        let mut sent = 0;
        for machine in self.machines.values() {
            let message = TransportMessage::for_equipment(
                machine.equipment(),
                MessageType::Heartbeat,
                timestamp,
                Vec::new(),
            );
            self.stats.record_heartbeat();
            if Self::emit(&self.out, &self.stats, message) {
                sent += 1;
            }
        }
        debug!(sent, "💓 Heartbeats emitted");
        sent
    }

    pub fn handle_command(&mut self, command: SimulatorCommand) {
        match command {
            SimulatorCommand::Trigger {
                equipment_id,
                to_state,
                reply,
            } => {
                let result = match self.machines.get_mut(&equipment_id) {
                    Some(machine) => machine.request_manual(&to_state),
                    None => Err(DomainError::EquipmentNotFound(equipment_id.clone())),
                };
                match &result {
                    Ok(()) => info!(equipment_id = %equipment_id, to_state = %to_state, "Manual transition requested"),
                    Err(e) => warn!(equipment_id = %equipment_id, "Manual transition refused: {}", e),
                }
                let _ = reply.send(result);
            }
        }
    }

    fn emit(
        out: &mpsc::Sender<TransportMessage>,
        stats: &SimulatorStats,
        message: TransportMessage,
    ) -> bool {
        match out.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(message)) => {
                stats.record_drop();
                warn!(
                    equipment_id = %message.equipment_id,
                    "⚠️ Publish channel full, dropping message"
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Publish channel closed");
                false
            }
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            interval_ms = self.config.update_interval_ms,
            equipment = self.machines.len(),
            "🚀 Starting simulator"
        );
        let mut ticker = tokio::time::interval(self.config.update_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let heartbeat_period = self.config.heartbeat_interval();
        let mut heartbeat = tokio::time::interval_at(Instant::now() + heartbeat_period, heartbeat_period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut registry_open = true;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick_once();
                }
                _ = heartbeat.tick() => {
                    self.emit_heartbeats();
                }
                changed = self.equipment.changed(), if registry_open => match changed {
                    Ok(()) => {
                        let set = self.equipment.borrow_and_update().clone();
                        self.apply_set(&set);
                    }
                    Err(_) => {
                        debug!("Equipment registry closed, keeping current set");
                        registry_open = false;
                    }
                },
                Some(command) = self.commands.recv() => self.handle_command(command),
            }
        }
        info!("Simulator stopped");
    }
}
