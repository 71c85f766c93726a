//! # Coordinator
//!
//! Reconciles the three event streams of a vehicle link (discovery, position
//! telemetry, capture triggers) into one capture-and-geotag action per trigger.
//!
//! - `PositionCache`: latest position sample, last write wins
//! - `SequenceCounter`: capture identifiers, advanced once per handled trigger
//! - `EventRouter`: single consumer of link events
//! - `CaptureWorker`: serialized capture, geotag and counter advance
//! - `CaptureCoordinator`: startup sequencing and the shutdown path

mod config;
mod coordinator;
mod error;
mod position_cache;
mod router;
mod sequence;
mod stats;
mod worker;

pub use config::{CoordinatorConfig, DEFAULT_OUTCOME_CAPACITY};
pub use coordinator::{CaptureCoordinator, CoordinatorState, RunReport};
pub use error::{Result, StartupError};
pub use position_cache::PositionCache;
pub use router::{EventRouter, LinkStatus, TimedEvent};
pub use sequence::SequenceCounter;
pub use stats::{CaptureStats, CaptureStatsSnapshot};
pub use worker::{CaptureQueue, CaptureWorker, WorkerContext, WorkerSettings};
