// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Core error type for Magnetar operations
#[derive(Error, Debug, Diagnostic)]
pub enum MagnetarError {
    /// Invalid resource
    #[error("Invalid resource: {reason}")]
    #[diagnostic(
        code(magnetar::invalid_resource),
        help("{suggestion}")
    )]
    InvalidResource {
        #[allow(unused)]
        reason: String,
        #[allow(unused)]
        suggestion: String,
    },

    /// Invalid resource quantity (CPU/memory strings)
    #[error("Invalid quantity '{value}': {message}")]
    #[diagnostic(
        code(magnetar::invalid_quantity),
        help("Quantities look like '500m', '2', '128Mi' or '1Gi'")
    )]
    InvalidQuantity {
        #[allow(unused)]
        value: String,
        #[allow(unused)]
        message: String,
    },

    /// Serialization error
    #[error("Serialization error: {message}")]
    #[diagnostic(
        code(magnetar::serialization_error),
        help("Check the resource document for malformed fields")
    )]
    SerializationError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, MagnetarError>;

impl MagnetarError {
    /// Create an InvalidResource error
    pub fn invalid_resource(reason: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::InvalidResource {
            reason: reason.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create an InvalidQuantity error
    pub fn invalid_quantity(value: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidQuantity {
            value: value.into(),
            message: message.into(),
        }
    }

    /// Create a SerializationError
    pub fn serialization_error(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::SerializationError {
            message: message.into(),
            source,
        }
    }
}
