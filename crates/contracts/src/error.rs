//! Layered error definitions
//!
//! Categorized by source: config / link / capture / geotag / storage

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    /// Connection descriptor could not be parsed
    #[error("invalid connection descriptor '{descriptor}': {message}")]
    InvalidDescriptor { descriptor: String, message: String },

    // ===== Collaborator Errors =====
    /// Capture device failed to produce an image
    #[error("capture '{identifier}' failed: {message}")]
    Capture { identifier: String, message: String },

    /// Geotag write failed
    #[error("geotag of '{path}' failed: {message}")]
    Geotag { path: String, message: String },

    /// No writable storage could be provisioned
    #[error("storage provisioning failed: {message}")]
    Storage { message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create descriptor parse error
    pub fn invalid_descriptor(descriptor: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidDescriptor {
            descriptor: descriptor.into(),
            message: message.into(),
        }
    }

    /// Create capture error
    pub fn capture(identifier: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Capture {
            identifier: identifier.into(),
            message: message.into(),
        }
    }

    /// Create geotag error
    pub fn geotag(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Geotag {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}
