//! Extension hot-reload system.
//!
//! Extensions ("cogs") are source files under a watched root. Each file maps
//! to a dotted identifier that the bot framework ([`ExtensionHost`]) loads,
//! unloads and reloads. The [`LifecycleManager`] keeps a status per
//! identifier and applies filesystem changes as they arrive.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  batches   ┌──────────────────┐  load/unload/reload  ┌───────────────┐
//! │ EventSource  │ ─────────▶ │ LifecycleManager │ ───────────────────▶ │ ExtensionHost │
//! │ (notify)     │            │  StatusRegistry  │                      │ (bot)         │
//! └──────────────┘            └──────────────────┘                      └───────────────┘
//!                                      │ failures
//!                                      ▼
//!                              FailureReporter
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use cogwatch_core::extension::{watch, MemoryHost};
//! use cogwatch_core::WatcherConfig;
//!
//! let host = Arc::new(MemoryHost::new());
//! let (manager, handle) = watch(host, WatcherConfig::new("cogs")).await?;
//!
//! for record in manager.list_statuses().await {
//!     println!("{} {}", record.id, record.status);
//! }
//!
//! if let Some(handle) = handle {
//!     handle.shutdown().await?;
//! }
//! ```

pub mod host;
pub mod manager;
pub mod memory;
pub mod path;
pub mod registry;
pub mod types;
pub mod watcher;

pub use host::{DynHost, ExtensionHost, FailureReporter, HostError, HostOperation, LogReporter};
pub use manager::{watch, LifecycleManager, WatchHandle};
pub use memory::{HostCall, MemoryHost};
pub use path::{
    discover, identifier_from_path, is_extension_file, may_be_directory, path_from_identifier,
};
pub use registry::StatusRegistry;
pub use types::{order_batch, ChangeKind, ExtensionId, ExtensionRecord, ExtensionStatus, FsEvent};
pub use watcher::{translate_event, ChannelSource, EventReceiver, EventSource, NotifySource};
