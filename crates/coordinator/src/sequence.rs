//! SequenceCounter - capture identifiers

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic capture counter
///
/// Starts at 0 and only ever moves forward by one. Never reset.
#[derive(Debug, Default)]
pub struct SequenceCounter {
    value: AtomicU64,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value the next capture will use
    pub fn current(&self) -> u64 {
        self.value.load(Ordering::SeqCst)
    }

    /// Move forward by one, returning the new value
    pub fn advance(&self) -> u64 {
        self.value.fetch_add(1, Ordering::SeqCst) + 1
    }
}
