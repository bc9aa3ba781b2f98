//! The host side of the lifecycle: the bot framework that actually loads code.
//!
//! Hosts expose raw load/unload/reload primitives through [`ExtensionHost`].
//! The [`LifecycleManager`](super::LifecycleManager) is the only supported
//! caller; a host driven directly will drift from the manager's registry.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::types::ExtensionId;

/// Failure of a single host operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    /// Load was requested for an extension the host already holds.
    #[error("Extension already loaded: {0}")]
    AlreadyLoaded(ExtensionId),

    /// Unload or reload was requested for an extension the host does not hold.
    #[error("Extension not loaded: {0}")]
    NotFound(ExtensionId),

    /// The extension itself failed: bad source, failing setup hook, and so on.
    #[error("Extension {id} failed: {message}")]
    ExtensionFailure { id: ExtensionId, message: String },

    #[error("Unexpected host error: {0}")]
    Unknown(String),
}

impl HostError {
    pub fn failure(id: &ExtensionId, message: impl Into<String>) -> Self {
        Self::ExtensionFailure {
            id: id.clone(),
            message: message.into(),
        }
    }
}

/// Host operations, used for logging and failure reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostOperation {
    Load,
    Unload,
    Reload,
}

impl fmt::Display for HostOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Load => "load",
            Self::Unload => "unload",
            Self::Reload => "reload",
        };
        f.write_str(s)
    }
}

/// A bot framework capable of loading extensions by identifier.
#[async_trait]
pub trait ExtensionHost: Send + Sync {
    async fn load_extension(&self, id: &ExtensionId) -> Result<(), HostError>;

    async fn unload_extension(&self, id: &ExtensionId) -> Result<(), HostError>;

    /// Replace a loaded extension with a fresh copy of its source.
    async fn reload_extension(&self, id: &ExtensionId) -> Result<(), HostError>;

    /// Identifiers the host currently holds. This is the authoritative view.
    async fn loaded_extensions(&self) -> Vec<ExtensionId>;

    async fn is_loaded(&self, id: &ExtensionId) -> bool {
        self.loaded_extensions().await.contains(id)
    }
}

/// Dynamic host type.
pub type DynHost = Arc<dyn ExtensionHost>;

/// Receives every failed host operation.
pub trait FailureReporter: Send + Sync {
    fn report(&self, operation: HostOperation, id: &ExtensionId, error: &HostError);
}

/// Default reporter: logs failures through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl FailureReporter for LogReporter {
    fn report(&self, operation: HostOperation, id: &ExtensionId, error: &HostError) {
        match error {
            HostError::ExtensionFailure { message, .. } => {
                tracing::error!(extension = %id, %operation, "Extension error: {}", message);
            }
            other => {
                tracing::error!(extension = %id, %operation, error = %other, "Host operation failed");
            }
        }
    }
}
