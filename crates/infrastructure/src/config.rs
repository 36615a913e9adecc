use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct SimulatorConfig {
    pub equipment_dir: String,
    pub update_interval_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub reload_interval_ms: u64,
    /// Fixed RNG seed for reproducible runs
    pub seed: Option<u64>,
    pub channel_capacity: usize,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            equipment_dir: "config/equipment".to_string(),
            update_interval_ms: 1_000,
            heartbeat_interval_ms: 30_000,
            reload_interval_ms: 5_000,
            seed: None,
            channel_capacity: 1_024,
        }
    }
}

impl SimulatorConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms.max(1))
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms.max(1))
    }

    pub fn reload_interval(&self) -> Duration {
        Duration::from_millis(self.reload_interval_ms.max(1))
    }
}

/// What the publisher does when its offline buffer is full
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum OverflowPolicy {
    #[default]
    DropOldest,
    RejectNewest,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct BrokerConfig {
    pub redis_url: String,
    pub queue_prefix: String,
    pub dead_letter_queue: String,
    pub buffer_capacity: usize,
    pub overflow_policy: OverflowPolicy,
    pub reconnect_initial_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
    pub flush_batch_size: usize,
    pub operation_timeout_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            queue_prefix: "telemetry:equipment:".to_string(),
            dead_letter_queue: "telemetry:dead-letter".to_string(),
            buffer_capacity: 10_000,
            overflow_policy: OverflowPolicy::DropOldest,
            reconnect_initial_delay_ms: 500,
            reconnect_max_delay_ms: 30_000,
            flush_batch_size: 100,
            operation_timeout_ms: 5_000,
        }
    }
}

impl BrokerConfig {
    pub fn reconnect_initial_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_delay_ms.max(1))
    }

    pub fn reconnect_max_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_delay_ms.max(self.reconnect_initial_delay_ms))
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms.max(1))
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Worker loops per queue
    pub concurrency: usize,
    pub batch_size: usize,
    pub processing_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            batch_size: 10,
            processing_timeout_ms: 10_000,
            poll_interval_ms: 250,
            max_retries: 3,
            initial_delay_ms: 1_000,
            backoff_multiplier: 2.0,
            max_delay_ms: 30_000,
        }
    }
}

impl ConsumerConfig {
    pub fn processing_timeout(&self) -> Duration {
        Duration::from_millis(self.processing_timeout_ms.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct WriterConfig {
    pub url: String,
    pub org: String,
    pub bucket: String,
    pub token: String,
    pub measurement: String,
    pub batch_size: usize,
    pub flush_interval_ms: u64,
    /// Retries after the first failed attempt
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8086".to_string(),
            org: "plant".to_string(),
            bucket: "telemetry".to_string(),
            token: String::new(),
            measurement: "equipment_telemetry".to_string(),
            batch_size: 500,
            flush_interval_ms: 1_000,
            retry_attempts: 3,
            retry_delay_ms: 1_000,
            request_timeout_ms: 10_000,
        }
    }
}

impl WriterConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms.max(1))
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.max(1))
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct HealthConfig {
    pub bind: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ServiceConfig {
    #[serde(default)]
    pub simulator: SimulatorConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub consumer: ConsumerConfig,
    #[serde(default)]
    pub writer: WriterConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_ms: u64,
}

fn default_shutdown_grace() -> u64 {
    5_000
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            simulator: SimulatorConfig::default(),
            broker: BrokerConfig::default(),
            consumer: ConsumerConfig::default(),
            writer: WriterConfig::default(),
            health: HealthConfig::default(),
            shutdown_grace_ms: default_shutdown_grace(),
        }
    }
}

impl ServiceConfig {
    pub fn load(config_dir: &str) -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Built-in defaults come from the serde defaults above
            // Local config file, e.g. config/default.toml
            .add_source(File::with_name(&format!("{}/default", config_dir)).required(false))
            // Run-mode overrides, e.g. config/production.toml
            .add_source(File::with_name(&format!("{}/{}", config_dir, run_mode)).required(false))
            // Environment variables (e.g. TELEMETRY__CONSUMER__CONCURRENCY=4)
            .add_source(
                Environment::with_prefix("TELEMETRY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        s.try_deserialize()
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}
