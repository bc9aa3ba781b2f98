//! Unified error handling for cogwatch.
//!
//! Host-side failures of a single extension are not represented here; they
//! use [`HostError`](crate::extension::HostError) and never leave the
//! lifecycle manager.

use std::path::PathBuf;

/// Unified error type for cogwatch.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The configured root is unusable, or a path does not contain the root name.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The watched root directory does not exist.
    #[error("Watched root not found: {}", .0.display())]
    RootNotFound(PathBuf),

    /// The watched root disappeared while it was being watched.
    #[error("Watched root vanished: {}", .0.display())]
    RootVanished(PathBuf),

    /// Filesystem watcher errors.
    #[error("Watch error: {0}")]
    Watch(String),

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(String),

    /// Configuration file could not be parsed.
    #[error("Parse error at {location}: {message}")]
    Parse { location: String, message: String },

    /// Generic internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for convenience.
pub type Result<T> = std::result::Result<T, Error>;

/// Shorthand for building an [`Error::InvalidConfiguration`].
#[macro_export]
macro_rules! config_err {
    ($msg:expr) => {
        $crate::error::Error::InvalidConfiguration($msg.into())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::Error::InvalidConfiguration(format!($fmt, $($arg)*))
    };
}

// Error conversion helpers
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<notify::Error> for Error {
    fn from(e: notify::Error) -> Self {
        Error::Watch(e.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Error::Internal(e.to_string())
    }
}

impl Error {
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the watch loop can recover from this error by waiting for the root.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::RootNotFound(_) | Error::RootVanished(_) | Error::Watch(_) | Error::Io(_)
        )
    }
}
