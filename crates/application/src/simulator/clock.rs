use tokio::time::Instant;

/// Milliseconds since the simulation started, read from the tokio clock so
/// paused-time tests control it.
#[derive(Debug, Clone, Copy)]
pub struct SimulationClock {
    started: Instant,
}

impl SimulationClock {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}
