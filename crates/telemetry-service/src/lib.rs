//! Telemetry service - wiring, lifecycle and the health/diagnostics HTTP surface

pub mod api;
pub mod service;
pub mod state;

pub use service::{Adapters, Role, TelemetryService};
