//! CaptureRequest / CaptureOutcome - capture worker input and output

use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::{Position, PositionFix, TriggerSource};

/// One queued capture
///
/// The position snapshot is taken when the trigger arrives, not when the
/// capture completes.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub source: TriggerSource,
    pub received_at: Instant,
    pub position: Option<PositionFix>,
}

impl CaptureRequest {
    pub fn new(source: TriggerSource, received_at: Instant, position: Option<PositionFix>) -> Self {
        Self {
            source,
            received_at,
            position,
        }
    }

    /// Position to write into the image, the sentinel when none is known
    pub fn tag_position(&self) -> Position {
        self.position
            .map(|fix| fix.position)
            .unwrap_or(Position::UNKNOWN)
    }

    /// Age of the snapshot at trigger receipt
    pub fn position_age(&self) -> Option<Duration> {
        self.position.map(|fix| fix.age_at(self.received_at))
    }
}

/// Result of handling one capture trigger
#[derive(Debug, Clone, Serialize)]
pub struct CaptureOutcome {
    /// Sequence value used for the image identifier
    pub sequence: u64,

    /// Trigger that caused this capture
    pub source: TriggerSource,

    /// Image produced, absent when the capture failed
    pub image_path: Option<PathBuf>,

    /// Position written (or intended) into the image
    pub position: Position,

    /// False when the sentinel position was used
    pub position_known: bool,

    /// Age of the position at trigger receipt
    pub position_age: Option<Duration>,

    pub status: CaptureStatus,

    /// Time spent in capture + tag
    pub duration: Duration,
}

impl CaptureOutcome {
    /// Whether an image file exists for this trigger
    pub fn captured(&self) -> bool {
        self.image_path.is_some()
    }
}

/// Per-trigger status
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "reason")]
pub enum CaptureStatus {
    /// Image captured and geotagged
    Tagged,
    /// Image captured, geotagging disabled
    TagSkipped,
    /// Image captured, geotag write failed
    TagFailed(String),
    /// No image produced
    CaptureFailed(String),
}

impl CaptureStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Tagged => "tagged",
            Self::TagSkipped => "tag_skipped",
            Self::TagFailed(_) => "tag_failed",
            Self::CaptureFailed(_) => "capture_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_without_fix_uses_sentinel() {
        let req = CaptureRequest::new(TriggerSource::Manual, Instant::now(), None);
        assert_eq!(req.tag_position(), Position::UNKNOWN);
        assert!(req.position_age().is_none());
    }

    #[test]
    fn request_position_age_measured_at_receipt() {
        let received_at = Instant::now() + Duration::from_millis(250);
        let fix = PositionFix::new(Position::new(1.0, 2.0, 3.0), received_at - Duration::from_millis(250));
        let req = CaptureRequest::new(TriggerSource::Manual, received_at, Some(fix));
        assert_eq!(req.tag_position(), Position::new(1.0, 2.0, 3.0));
        assert_eq!(req.position_age(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn status_serializes_with_reason() {
        let json = serde_json::to_string(&CaptureStatus::TagFailed("not a jpeg".into())).unwrap();
        assert_eq!(json, r#"{"status":"tag_failed","reason":"not a jpeg"}"#);
    }
}
