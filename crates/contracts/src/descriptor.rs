//! ConnectionDescriptor - how to reach the vehicle
//!
//! Accepted forms:
//! - `tcp://[server_host][:server_port]`
//! - `udp://[bind_host][:bind_port]`
//! - `serial:///path/to/serial/dev[:baudrate]`

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ContractError;

/// Default UDP bind port (simulator / companion link)
pub const DEFAULT_UDP_PORT: u16 = 14540;

/// Default TCP server port (SITL)
pub const DEFAULT_TCP_PORT: u16 = 5760;

/// Default serial baudrate
pub const DEFAULT_SERIAL_BAUD: u32 = 57600;

const DEFAULT_UDP_HOST: &str = "0.0.0.0";
const DEFAULT_TCP_HOST: &str = "127.0.0.1";

/// Parsed vehicle connection descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionDescriptor {
    /// Connect out to a TCP server
    Tcp { host: String, port: u16 },
    /// Bind a UDP socket and listen
    Udp { host: String, port: u16 },
    /// Serial device
    Serial { path: String, baud: u32 },
}

impl ConnectionDescriptor {
    /// Transport name used in logs
    pub fn transport(&self) -> &'static str {
        match self {
            Self::Tcp { .. } => "tcp",
            Self::Udp { .. } => "udp",
            Self::Serial { .. } => "serial",
        }
    }

    fn parse_host_port(
        raw: &str,
        rest: &str,
        default_host: &str,
        default_port: u16,
    ) -> Result<(String, u16), ContractError> {
        if rest.contains('/') {
            return Err(ContractError::invalid_descriptor(
                raw,
                "unexpected path component",
            ));
        }

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| {
                    ContractError::invalid_descriptor(raw, format!("invalid port '{port}'"))
                })?;
                (host, port)
            }
            None => (rest, default_port),
        };

        let host = if host.is_empty() { default_host } else { host };
        Ok((host.to_string(), port))
    }

    fn parse_serial(raw: &str, rest: &str) -> Result<(String, u32), ContractError> {
        let (path, baud) = match rest.rsplit_once(':') {
            Some((path, baud)) => {
                let baud = baud.parse::<u32>().map_err(|_| {
                    ContractError::invalid_descriptor(raw, format!("invalid baudrate '{baud}'"))
                })?;
                (path, baud)
            }
            None => (rest, DEFAULT_SERIAL_BAUD),
        };

        if path.is_empty() {
            return Err(ContractError::invalid_descriptor(raw, "missing serial device path"));
        }
        if baud == 0 {
            return Err(ContractError::invalid_descriptor(raw, "baudrate must be > 0"));
        }
        Ok((path.to_string(), baud))
    }
}

impl FromStr for ConnectionDescriptor {
    type Err = ContractError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ContractError::invalid_descriptor(raw, "empty descriptor"));
        }

        let (scheme, rest) = trimmed.split_once("://").ok_or_else(|| {
            ContractError::invalid_descriptor(raw, "expected '<scheme>://' prefix")
        })?;

        match scheme.to_ascii_lowercase().as_str() {
            "udp" => {
                let (host, port) =
                    Self::parse_host_port(raw, rest, DEFAULT_UDP_HOST, DEFAULT_UDP_PORT)?;
                Ok(Self::Udp { host, port })
            }
            "tcp" => {
                let (host, port) =
                    Self::parse_host_port(raw, rest, DEFAULT_TCP_HOST, DEFAULT_TCP_PORT)?;
                Ok(Self::Tcp { host, port })
            }
            "serial" => {
                let (path, baud) = Self::parse_serial(raw, rest)?;
                Ok(Self::Serial { path, baud })
            }
            other => Err(ContractError::invalid_descriptor(
                raw,
                format!("unsupported scheme '{other}' (expected tcp, udp or serial)"),
            )),
        }
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
            Self::Udp { host, port } => write!(f, "udp://{host}:{port}"),
            Self::Serial { path, baud } => write!(f, "serial://{path}:{baud}"),
        }
    }
}

impl Serialize for ConnectionDescriptor {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ConnectionDescriptor {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
