//! Vehicle link abstraction
//!
//! Defines the trait the coordinator drives, implemented by the real MAVLink
//! link and the mock link.

use std::future::Future;

use contracts::{ConnectionDescriptor, VehicleEventCallback};

use crate::error::Result;

/// Vehicle link trait
///
/// Event delivery happens on the link's own threads through the callback
/// registered with [`VehicleLink::listen`]. Nothing is delivered before
/// `listen` is called.
pub trait VehicleLink: Send + Sync {
    /// Link name (used for logging)
    fn name(&self) -> &str;

    /// Open the transport described by `descriptor`
    ///
    /// Returns once the transport is open; discovery of a remote system is
    /// reported later as a `SystemDiscovered` event.
    fn connect(
        &mut self,
        descriptor: &ConnectionDescriptor,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Start delivering events
    ///
    /// Idempotent: a second call keeps the first callback.
    fn listen(&self, callback: VehicleEventCallback);

    /// Ask the discovered system to stream global position at `rate_hz`
    fn set_position_rate(&self, rate_hz: f64) -> impl Future<Output = Result<()>> + Send;

    /// Stop delivering events and release the transport threads
    fn stop(&self);

    /// Whether events are currently being delivered
    fn is_listening(&self) -> bool;
}
