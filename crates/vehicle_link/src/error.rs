//! Vehicle link error types

use contracts::ContractError;
use thiserror::Error;

/// Vehicle link specific error
#[derive(Debug, Error)]
pub enum LinkError {
    /// Transport could not be opened
    #[error("failed to connect to '{descriptor}': {message}")]
    ConnectionFailed { descriptor: String, message: String },

    /// Operation needs an open connection
    #[error("vehicle link is not connected")]
    NotConnected,

    /// Autopilot refused the telemetry rate request
    #[error("position rate {rate_hz} Hz rejected: {message}")]
    RateRejected { rate_hz: f64, message: String },

    /// Outgoing message could not be written
    #[error("failed to send {message_name}: {message}")]
    SendFailed {
        message_name: String,
        message: String,
    },

    /// Wrapped ContractError
    #[error(transparent)]
    Contract(#[from] ContractError),
}

impl LinkError {
    /// Create connection error
    pub fn connection(descriptor: impl ToString, message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            descriptor: descriptor.to_string(),
            message: message.into(),
        }
    }

    /// Create rate rejection error
    pub fn rate_rejected(rate_hz: f64, message: impl Into<String>) -> Self {
        Self::RateRejected {
            rate_hz,
            message: message.into(),
        }
    }

    /// Create send error
    pub fn send(message_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SendFailed {
            message_name: message_name.into(),
            message: message.into(),
        }
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, LinkError>;
