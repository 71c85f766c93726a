//! PositionCache - latest position sample
//!
//! Last-write-wins, no averaging, no out-of-order rejection. The lock is only
//! held to copy a `PositionFix` in or out, so readers never observe a
//! partially written sample.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Instant;

use contracts::{Position, PositionFix};

/// Thread-safe holder of the most recent position
#[derive(Debug, Default)]
pub struct PositionCache {
    latest: RwLock<Option<PositionFix>>,
    updates: AtomicU64,
}

impl PositionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a sample received now
    pub fn update(&self, position: Position) {
        self.update_at(position, Instant::now());
    }

    /// Store a sample with an explicit arrival instant
    pub fn update_at(&self, position: Position, received_at: Instant) {
        let fix = PositionFix::new(position, received_at);
        *self.latest.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(fix);
        self.updates.fetch_add(1, Ordering::Relaxed);
    }

    /// Most recent position, `Position::UNKNOWN` before the first sample
    pub fn read(&self) -> Position {
        self.latest()
            .map(|fix| fix.position)
            .unwrap_or(Position::UNKNOWN)
    }

    /// Most recent sample with its arrival instant
    pub fn latest(&self) -> Option<PositionFix> {
        *self.latest.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_known(&self) -> bool {
        self.latest().is_some()
    }

    /// Number of samples stored so far
    pub fn update_count(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }
}
