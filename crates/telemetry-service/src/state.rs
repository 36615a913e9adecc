use std::sync::Arc;

use application::consumer::{ConsumerSnapshot, QueueConsumer};
use application::simulator::{EquipmentStatus, SimulatorHandle, SimulatorSnapshot};
use application::writer::{TimeSeriesWriter, WriterSnapshot};
use domain::broker::{ConnectionState, QueueTransport};
use domain::health::{ErrorSnapshot, ErrorTracker};
use infrastructure::{BufferedQueuePublisher, EquipmentRegistry, PublisherSnapshot};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerHealth {
    pub connection_state: ConnectionState,
    pub connected: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatorHealth {
    #[serde(flatten)]
    pub counters: SimulatorSnapshot,
    pub equipment_version: u64,
}

/// Body of `GET /health`. Sections of components not running in this role are omitted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: HealthStatus,
    pub broker: BrokerHealth,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<PublisherSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumer: Option<ConsumerSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub writer: Option<WriterSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulator: Option<SimulatorHealth>,
    pub errors: ErrorSnapshot,
}

/// Shared handles read by the HTTP surface
pub struct AppState {
    pub registry: EquipmentRegistry,
    pub transport: Arc<dyn QueueTransport>,
    pub errors: Arc<ErrorTracker>,
    pub simulator: Option<SimulatorHandle>,
    pub publisher: Option<BufferedQueuePublisher>,
    pub consumer: Option<QueueConsumer>,
    pub writer: Option<TimeSeriesWriter>,
}

impl AppState {
    pub async fn health(&self) -> HealthReport {
        let publisher = self.publisher.as_ref().map(BufferedQueuePublisher::snapshot);
        let broker = match &publisher {
            Some(snapshot) => BrokerHealth {
                connection_state: snapshot.connection_state,
                connected: snapshot.connected,
            },
            None => {
                let connected = self.transport.is_connected();
                BrokerHealth {
                    connection_state: if connected {
                        ConnectionState::Connected
                    } else {
                        ConnectionState::Disconnected
                    },
                    connected,
                }
            }
        };

        let consumer = match &self.consumer {
            Some(consumer) => Some(consumer.snapshot().await),
            None => None,
        };

        HealthReport {
            status: if broker.connected {
                HealthStatus::Ok
            } else {
                HealthStatus::Degraded
            },
            broker,
            publisher,
            consumer,
            writer: self.writer.as_ref().map(TimeSeriesWriter::snapshot),
            simulator: self.simulator.as_ref().map(|handle| SimulatorHealth {
                counters: handle.snapshot(),
                equipment_version: self.registry.current().version,
            }),
            errors: self.errors.snapshot(),
        }
    }

    /// Live status from the simulator, or the configured view when it isn't running here
    pub fn equipment(&self) -> Vec<EquipmentStatus> {
        if let Some(simulator) = &self.simulator {
            return simulator.equipment();
        }
        self.registry
            .current()
            .equipment
            .iter()
            .map(|e| EquipmentStatus {
                equipment_id: e.id.clone(),
                name: e.name.clone(),
                equipment_type: e.equipment_type.clone(),
                state: e.current_state.clone(),
                last_update: None,
                messages: 0,
                transitions: 0,
            })
            .collect()
    }
}
