use std::sync::Arc;

use anyhow::{Context, Result};
use application::consumer::{ConsumerSettings, QueueConsumer};
use application::simulator::{Simulator, SimulatorHandle, spawn_publish_pump};
use application::writer::TimeSeriesWriter;
use axum::Router;
use domain::DomainError;
use domain::broker::QueueTransport;
use domain::health::ErrorTracker;
use domain::sink::TimeSeriesSink;
use infrastructure::repositories::{EquipmentConfigWatcher, EquipmentLoader, EquipmentRegistry};
use infrastructure::{BufferedQueuePublisher, InfluxSink, RedisQueue, ServiceConfig};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api;
use crate::state::AppState;

/// Which half of the pipeline this process runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Role {
    /// Simulator, publisher, consumer and writer
    All,
    /// Simulator and publisher only
    Simulator,
    /// Consumer and writer only
    Ingest,
}

impl Role {
    pub fn runs_simulator(&self) -> bool {
        matches!(self, Self::All | Self::Simulator)
    }

    pub fn runs_ingest(&self) -> bool {
        matches!(self, Self::All | Self::Ingest)
    }
}

/// The external systems the service talks to
pub struct Adapters {
    pub transport: Arc<dyn QueueTransport>,
    pub sink: Arc<dyn TimeSeriesSink>,
}

impl Adapters {
    pub fn from_config(config: &ServiceConfig) -> Result<Self, DomainError> {
        let transport = RedisQueue::connect(&config.broker.redis_url, config.broker.operation_timeout())?;
        let sink = InfluxSink::new(&config.writer)?;
        Ok(Self {
            transport: Arc::new(transport),
            sink: Arc::new(sink),
        })
    }
}

struct SimulationTasks {
    cancel: CancellationToken,
    simulator: JoinHandle<()>,
    pump: JoinHandle<u64>,
    flusher_cancel: CancellationToken,
    flusher: JoinHandle<()>,
    publisher: BufferedQueuePublisher,
}

struct IngestTasks {
    consumer: QueueConsumer,
    queue_sync: JoinHandle<()>,
    writer_cancel: CancellationToken,
    writer: JoinHandle<()>,
}

/// A running pipeline. Dropping it leaves tasks running; call `shutdown`.
pub struct TelemetryService {
    config: ServiceConfig,
    state: Arc<AppState>,
    background: CancellationToken,
    watcher: JoinHandle<()>,
    simulation: Option<SimulationTasks>,
    ingest: Option<IngestTasks>,
}

impl TelemetryService {
    pub async fn start(config: ServiceConfig, role: Role, adapters: Adapters) -> Result<Self> {
        let errors = Arc::new(ErrorTracker::new());
        let background = CancellationToken::new();

        // 1. Equipment documents; an invalid set is fatal at startup
        let loader = EquipmentLoader::new(&config.simulator.equipment_dir);
        let snapshot = loader
            .read_snapshot()
            .await
            .context("failed to read equipment configuration")?;
        let set = EquipmentLoader::parse_snapshot(&snapshot)
            .context("invalid equipment configuration")?;
        info!(equipment = set.len(), dir = %config.simulator.equipment_dir, "✅ Equipment loaded");

        let registry = EquipmentRegistry::new(set);
        let watcher = EquipmentConfigWatcher::new(loader, registry.clone(), errors.clone(), snapshot);
        let watcher = tokio::spawn(watcher.run(config.simulator.reload_interval(), background.clone()));

        // 2. Ingest side first, so queues are drained as soon as messages arrive
        let ingest = if role.runs_ingest() {
            Some(Self::start_ingest(&config, &adapters, &registry, &errors, &background).await)
        } else {
            None
        };

        // 3. Simulation side
        let simulation = if role.runs_simulator() {
            Some(Self::start_simulation(&config, &adapters, &registry, &errors).await)
        } else {
            None
        };

        let state = Arc::new(AppState {
            registry,
            transport: adapters.transport.clone(),
            errors,
            simulator: simulation.as_ref().map(|s| s.0.clone()),
            publisher: simulation.as_ref().map(|s| s.1.publisher.clone()),
            consumer: ingest.as_ref().map(|i| i.0.consumer.clone()),
            writer: ingest.as_ref().map(|i| i.1.clone()),
        });

        info!(?role, "🚀 Telemetry pipeline running");
        Ok(Self {
            config,
            state,
            background,
            watcher,
            simulation: simulation.map(|s| s.1),
            ingest: ingest.map(|i| i.0),
        })
    }

    async fn start_ingest(
        config: &ServiceConfig,
        adapters: &Adapters,
        registry: &EquipmentRegistry,
        errors: &Arc<ErrorTracker>,
        background: &CancellationToken,
    ) -> (IngestTasks, TimeSeriesWriter) {
        let writer_cancel = CancellationToken::new();
        let (writer, writer_task) =
            TimeSeriesWriter::spawn(adapters.sink.clone(), config.writer.clone(), writer_cancel.clone());

        let consumer = QueueConsumer::new(
            adapters.transport.clone(),
            writer.clone(),
            ConsumerSettings::from_service(config),
            errors.clone(),
        );
        let current = registry.current();
        consumer.ensure_queues(current.ids()).await;

        // Workers follow equipment added or removed by a reload
        let queue_sync = {
            let consumer = consumer.clone();
            let mut updates = registry.subscribe();
            let cancel = background.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        changed = updates.changed() => {
                            if changed.is_err() {
                                break;
                            }
                            let set = updates.borrow_and_update().clone();
                            let started = consumer.ensure_queues(set.ids()).await;
                            let retired = consumer.retire_missing(set.ids()).await;
                            if started > 0 || retired > 0 {
                                info!(started, retired, version = set.version, "Consumers synced with equipment");
                            }
                        }
                    }
                }
                debug!("Queue sync stopped");
            })
        };

        (
            IngestTasks {
                consumer,
                queue_sync,
                writer_cancel,
                writer: writer_task,
            },
            writer,
        )
    }

    async fn start_simulation(
        config: &ServiceConfig,
        adapters: &Adapters,
        registry: &EquipmentRegistry,
        errors: &Arc<ErrorTracker>,
    ) -> (SimulatorHandle, SimulationTasks) {
        let publisher = BufferedQueuePublisher::new(
            adapters.transport.clone(),
            &config.broker,
            config.consumer.max_retries,
            errors.clone(),
        );
        publisher.connect().await;
        let flusher_cancel = CancellationToken::new();
        let flusher = publisher.start_flusher(flusher_cancel.clone());

        let (tx, rx) = mpsc::channel(config.simulator.channel_capacity.max(1));
        let (simulator, handle) = Simulator::new(config.simulator.clone(), registry.subscribe(), tx);
        let cancel = CancellationToken::new();
        let simulator = tokio::spawn(simulator.run(cancel.clone()));
        let pump = spawn_publish_pump(rx, Arc::new(publisher.clone()));

        (
            handle,
            SimulationTasks {
                cancel,
                simulator,
                pump,
                flusher_cancel,
                flusher,
                publisher,
            },
        )
    }

    pub fn state(&self) -> Arc<AppState> {
        self.state.clone()
    }

    pub fn router(&self) -> Router {
        api::create_router(self.state.clone())
    }

    /// Stops the pipeline front to back: simulator, publisher backlog,
    /// consumers and their pending retries, then the writer's last flush.
    pub async fn shutdown(self) {
        let grace = self.config.shutdown_grace();
        info!("🛑 Shutting down telemetry pipeline");

        if let Some(sim) = self.simulation {
            sim.cancel.cancel();
            let _ = sim.simulator.await;
            // The pump ends once the simulator's sender is gone
            match sim.pump.await {
                Ok(forwarded) => debug!(forwarded, "Publish pump drained"),
                Err(e) => warn!("Publish pump failed: {}", e),
            }
            sim.flusher_cancel.cancel();
            let _ = sim.flusher.await;
            let abandoned = sim.publisher.drain(grace).await;
            if abandoned > 0 {
                warn!(abandoned, "⚠️ Messages abandoned in publisher buffer");
            }
        }

        self.background.cancel();
        let _ = self.watcher.await;

        if let Some(ingest) = self.ingest {
            let _ = ingest.queue_sync.await;
            ingest.consumer.shutdown(grace).await;
            ingest.writer_cancel.cancel();
            let _ = ingest.writer.await;
        }

        info!("✅ Telemetry pipeline stopped");
    }
}
