use serde::{Deserialize, Serialize};

/// Publisher-side view of the broker link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ConnectionState {
    /// No link and no attempt in progress
    #[default]
    Disconnected,
    /// First connection attempt in progress
    Connecting,
    Connected,
    /// Re-establishing a link that was lost
    Reconnecting,
    /// Gave up; only set when the publisher shuts down with a dead link
    Failed,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::Connecting | Self::Reconnecting)
    }

    /// State to enter when starting a connection attempt
    pub fn begin_attempt(&self) -> Self {
        match self {
            Self::Disconnected => Self::Connecting,
            Self::Connecting => Self::Connecting,
            _ => Self::Reconnecting,
        }
    }

    /// State after an attempt or an operation succeeded
    pub fn on_success(&self) -> Self {
        Self::Connected
    }

    /// State after a failed operation or attempt
    pub fn on_failure(&self) -> Self {
        match self {
            Self::Connecting => Self::Disconnected,
            Self::Failed => Self::Failed,
            _ => Self::Reconnecting,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Reconnecting => "Reconnecting",
            Self::Failed => "Failed",
        }
    }
}
