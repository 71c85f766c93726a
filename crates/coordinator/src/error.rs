//! Coordinator error types

use std::time::Duration;

use contracts::ContractError;
use thiserror::Error;
use vehicle_link::LinkError;

/// Fatal startup failures
///
/// Per-trigger failures never surface here; they are reported through
/// `CaptureOutcome`.
#[derive(Debug, Error)]
pub enum StartupError {
    /// Transport could not be opened
    #[error("vehicle connection failed")]
    Connection(#[source] LinkError),

    /// No remote system within the discovery window
    #[error("no system discovered within {} ms", .timeout.as_millis())]
    DiscoveryTimeout { timeout: Duration },

    /// Telemetry rate request failed
    #[error("setting the position telemetry rate failed")]
    PositionRate(#[source] LinkError),

    /// Storage root could not be resolved
    #[error("storage provisioning failed")]
    Storage(#[source] ContractError),

    /// Shutdown requested before startup completed
    #[error("shutdown requested during startup")]
    Interrupted,
}

impl StartupError {
    /// Whether the process should still exit successfully
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, StartupError>;
