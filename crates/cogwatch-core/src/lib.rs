//! Hot-reload lifecycle management for bot extensions.
//!
//! This crate watches a directory of extension source files, translates file
//! paths into dotted extension identifiers, and keeps a bot framework's loaded
//! set in step with the files on disk.

pub mod config;
pub mod error;
pub mod extension;
pub mod logging;

pub use config::WatcherConfig;
pub use error::{Error, Result};
pub use extension::{
    watch, ExtensionHost, ExtensionId, ExtensionStatus, LifecycleManager, WatchHandle,
};

/// Re-exports commonly used types.
pub mod prelude {
    pub use crate::config::{defaults, env_vars, WatcherConfig};
    pub use crate::error::{Error, Result};
    pub use crate::extension::{
        identifier_from_path, watch, ChangeKind, DynHost, ExtensionHost, ExtensionId,
        ExtensionRecord, ExtensionStatus, FailureReporter, FsEvent, HostError, HostOperation,
        LifecycleManager, MemoryHost, WatchHandle,
    };
    pub use crate::logging::init_tracing;
}
