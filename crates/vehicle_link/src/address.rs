//! Connection descriptor to MAVLink address mapping
//!
//! The mavlink crate addresses transports as `udpin:host:port`,
//! `tcpout:host:port` and `serial:path:baud`.

use contracts::ConnectionDescriptor;

/// Translate a descriptor into a mavlink connection address
///
/// UDP listens for the autopilot (it sends to us), TCP dials out.
pub fn mavlink_address(descriptor: &ConnectionDescriptor) -> String {
    match descriptor {
        ConnectionDescriptor::Udp { host, port } => format!("udpin:{host}:{port}"),
        ConnectionDescriptor::Tcp { host, port } => format!("tcpout:{host}:{port}"),
        ConnectionDescriptor::Serial { path, baud } => format!("serial:{path}:{baud}"),
    }
}
