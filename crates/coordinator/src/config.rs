//! Coordinator configuration

use std::time::Duration;

use contracts::AgentConfig;

/// Outcome broadcast buffer; slow subscribers lag rather than block capture
pub const DEFAULT_OUTCOME_CAPACITY: usize = 64;

/// Timing and policy used by the coordinator
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// How long to wait for the first remote system
    pub discovery_timeout: Duration,
    /// Requested position telemetry rate (Hz)
    pub position_rate_hz: f64,
    /// Wait after the rate request so a first sample can arrive
    pub initial_telemetry_delay: Duration,
    /// Upper bound for one capture call
    pub capture_timeout: Duration,
    pub geotag_enabled: bool,
    /// Older snapshots are logged as stale
    pub stale_position_after: Duration,
    pub outcome_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::from(&AgentConfig::default())
    }
}

impl From<&AgentConfig> for CoordinatorConfig {
    fn from(config: &AgentConfig) -> Self {
        Self {
            discovery_timeout: config.link.discovery_timeout(),
            position_rate_hz: config.link.position_rate_hz,
            initial_telemetry_delay: config.link.initial_telemetry_delay(),
            capture_timeout: config.camera.capture_timeout(),
            geotag_enabled: config.geotag.enabled,
            stale_position_after: config.geotag.stale_position_after(),
            outcome_capacity: DEFAULT_OUTCOME_CAPACITY,
        }
    }
}
