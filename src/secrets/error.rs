//! Error types for tenant secret operations.

use thiserror::Error;

/// Result type for secrets operations.
pub type Result<T> = std::result::Result<T, SecretsError>;

/// Errors that can occur while resolving tenant secrets.
#[derive(Error, Debug)]
pub enum SecretsError {
    /// The tenant has no bundle in the backend.
    #[error("Secrets not found: {message}")]
    NotFound { message: String },

    /// Authentication with the secrets backend failed.
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    /// Backend rejected the request or returned an unexpected shape.
    #[error("Backend error: {message}")]
    Backend { message: String },

    /// Configuration error. Fatal at construction time.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// A secret exists but does not have the requested type.
    #[error("Secret '{key}' is not a {expected} (found {found})")]
    TypeMismatch { key: String, expected: &'static str, found: &'static str },

    /// The bundle could not be bound onto the destination structure.
    #[error("Unable to bind secrets: {message}")]
    Binding { message: String },

    /// The bound structure failed validation.
    #[error("Secret validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SecretsError {
    /// Create a not found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound { message: message.into() }
    }

    /// Create an authentication failed error.
    pub fn authentication_failed(message: impl Into<String>) -> Self {
        Self::AuthenticationFailed { message: message.into() }
    }

    /// Create a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend { message: message.into() }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    /// Create a type mismatch error.
    pub fn type_mismatch(
        key: impl Into<String>,
        expected: &'static str,
        found: &'static str,
    ) -> Self {
        Self::TypeMismatch { key: key.into(), expected, found }
    }

    /// Create a binding error.
    pub fn binding(message: impl Into<String>) -> Self {
        Self::Binding { message: message.into() }
    }

    /// Whether the error came from the backend rather than from the caller's input.
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::Backend { .. } | Self::AuthenticationFailed { .. }
        )
    }
}
