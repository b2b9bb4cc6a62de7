use crate::render::DeviceState;

#[derive(Debug, thiserror::Error)]
pub enum DisplayError {
    #[error("VRAM exhausted: requested {requested} bytes, {remaining} remaining")]
    AllocationExhausted { requested: u64, remaining: u64 },

    #[error("Render subsystem unavailable: {0}")]
    SubsystemUnavailable(String),

    #[error("Invalid state transition: {op} while {state:?}")]
    InvalidStateTransition { op: &'static str, state: DeviceState },

    #[error("Hardware sync timed out after {waited_ms} ms")]
    HardwareSyncTimeout { waited_ms: u64 },

    #[error("Surface mismatch: {0}")]
    SurfaceMismatch(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] crate::config::ConfigError),
}

impl DisplayError {
    /// True for errors caused by calling the device API in the wrong order.
    pub fn is_state_error(&self) -> bool {
        matches!(self, DisplayError::InvalidStateTransition { .. })
    }
}
