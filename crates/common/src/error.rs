//! Error types shared by the apclient crates.

use thiserror::Error;

/// Application result type.
pub type AppResult<T> = Result<T, AppError>;

/// Application error type.
#[derive(Debug, Error)]
pub enum AppError {
    // === Local validation ===
    #[error("Invalid IRI {iri:?}: {reason}")]
    InvalidIri { iri: String, reason: String },

    // === Key material ===
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Unsupported key: {0}")]
    UnsupportedKey(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Missing header: {0}")]
    MissingHeader(String),

    #[error("Invalid signature header: {0}")]
    InvalidSignatureHeader(String),

    // === Environment ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the error code used in CLI diagnostics.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidIri { .. } => "INVALID_IRI",
            Self::InvalidKey(_) => "INVALID_KEY",
            Self::UnsupportedKey(_) => "UNSUPPORTED_KEY",
            Self::Signing(_) => "SIGNING_FAILED",
            Self::MissingHeader(_) => "MISSING_HEADER",
            Self::InvalidSignatureHeader(_) => "INVALID_SIGNATURE_HEADER",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns whether the error was caused by the caller's input rather than
    /// the environment.
    #[must_use]
    pub const fn is_local(&self) -> bool {
        matches!(
            self,
            Self::InvalidIri { .. }
                | Self::InvalidKey(_)
                | Self::UnsupportedKey(_)
                | Self::MissingHeader(_)
                | Self::InvalidSignatureHeader(_)
        )
    }
}

// === From implementations ===

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}
