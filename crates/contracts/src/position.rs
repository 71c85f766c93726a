//! Position - telemetry output
//!
//! Latest-known global position of the vehicle.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Global position sample
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// Latitude (degrees, WGS84)
    pub latitude_deg: f64,

    /// Longitude (degrees, WGS84)
    pub longitude_deg: f64,

    /// Altitude relative to the home position (meters)
    pub relative_altitude_m: f64,
}

impl Position {
    /// Placeholder used while no telemetry has arrived
    pub const UNKNOWN: Position = Position {
        latitude_deg: 0.0,
        longitude_deg: 0.0,
        relative_altitude_m: 0.0,
    };

    pub fn new(latitude_deg: f64, longitude_deg: f64, relative_altitude_m: f64) -> Self {
        Self {
            latitude_deg,
            longitude_deg,
            relative_altitude_m,
        }
    }

    /// Whether all three fields are finite numbers
    pub fn is_finite(&self) -> bool {
        self.latitude_deg.is_finite()
            && self.longitude_deg.is_finite()
            && self.relative_altitude_m.is_finite()
    }
}

/// A position together with the instant it arrived at the agent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionFix {
    pub position: Position,
    pub received_at: Instant,
}

impl PositionFix {
    pub fn new(position: Position, received_at: Instant) -> Self {
        Self {
            position,
            received_at,
        }
    }

    /// Age of the fix relative to `now`
    pub fn age_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.received_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_is_all_zero() {
        assert_eq!(Position::UNKNOWN, Position::new(0.0, 0.0, 0.0));
        assert_eq!(Position::default(), Position::UNKNOWN);
    }

    #[test]
    fn fix_age_saturates() {
        let now = Instant::now();
        let fix = PositionFix::new(Position::UNKNOWN, now + Duration::from_secs(1));
        assert_eq!(fix.age_at(now), Duration::ZERO);
    }

    #[test]
    fn non_finite_position_detected() {
        assert!(Position::new(-23.55, -46.63, 120.4).is_finite());
        assert!(!Position::new(f64::NAN, 0.0, 0.0).is_finite());
    }
}
