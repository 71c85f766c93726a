//! Capture statistics

use std::sync::atomic::{AtomicU64, Ordering};

use contracts::{CaptureOutcome, CaptureStatus};

/// Counters shared by the router and the capture worker
#[derive(Debug, Default)]
pub struct CaptureStats {
    /// Triggers queued for capture
    triggers_received: AtomicU64,
    /// Triggers seen before capture handling was armed
    triggers_ignored: AtomicU64,
    /// Position samples stored
    position_updates: AtomicU64,
    /// Triggers that produced an image
    images_captured: AtomicU64,
    images_tagged: AtomicU64,
    tag_failures: AtomicU64,
    capture_failures: AtomicU64,
}

impl CaptureStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_triggers_received(&self) {
        self.triggers_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_triggers_ignored(&self) {
        self.triggers_ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_position_updates(&self) {
        self.position_updates.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one handled trigger by its status
    pub fn record(&self, outcome: &CaptureOutcome) {
        match outcome.status {
            CaptureStatus::Tagged => {
                self.images_captured.fetch_add(1, Ordering::Relaxed);
                self.images_tagged.fetch_add(1, Ordering::Relaxed);
            }
            CaptureStatus::TagSkipped => {
                self.images_captured.fetch_add(1, Ordering::Relaxed);
            }
            CaptureStatus::TagFailed(_) => {
                self.images_captured.fetch_add(1, Ordering::Relaxed);
                self.tag_failures.fetch_add(1, Ordering::Relaxed);
            }
            CaptureStatus::CaptureFailed(_) => {
                self.capture_failures.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Get snapshot of all counters
    pub fn snapshot(&self) -> CaptureStatsSnapshot {
        CaptureStatsSnapshot {
            triggers_received: self.triggers_received.load(Ordering::Relaxed),
            triggers_ignored: self.triggers_ignored.load(Ordering::Relaxed),
            position_updates: self.position_updates.load(Ordering::Relaxed),
            images_captured: self.images_captured.load(Ordering::Relaxed),
            images_tagged: self.images_tagged.load(Ordering::Relaxed),
            tag_failures: self.tag_failures.load(Ordering::Relaxed),
            capture_failures: self.capture_failures.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of capture counters (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStatsSnapshot {
    pub triggers_received: u64,
    pub triggers_ignored: u64,
    pub position_updates: u64,
    pub images_captured: u64,
    pub images_tagged: u64,
    pub tag_failures: u64,
    pub capture_failures: u64,
}

impl CaptureStatsSnapshot {
    /// Triggers that went through the capture worker
    pub fn handled(&self) -> u64 {
        self.images_captured + self.capture_failures
    }
}
