//! Shared helpers for lifecycle integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use cogwatch_core::extension::{ChannelSource, ExtensionId, LifecycleManager, MemoryHost};
use cogwatch_core::{ExtensionStatus, WatcherConfig};
use tempfile::TempDir;

/// A temporary bot directory with a `cogs` root inside it.
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let workspace = Self::without_root();
        std::fs::create_dir_all(workspace.root()).unwrap();
        workspace
    }

    pub fn without_root() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn root(&self) -> PathBuf {
        self.dir.path().join("cogs")
    }

    /// Write an extension file relative to the root and return its path.
    pub fn write(&self, relative: &str) -> PathBuf {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, "// extension\n").unwrap();
        path
    }

    pub fn config(&self) -> WatcherConfig {
        WatcherConfig::new("cogs")
            .with_base_dir(self.dir.path())
            .with_debug(false)
            .with_restart_delay_ms(10)
            .with_root_poll(5, 20)
    }
}

/// A manager wired to a [`MemoryHost`] and a [`ChannelSource`].
pub fn channel_manager(
    config: WatcherConfig,
    host: Arc<MemoryHost>,
) -> (LifecycleManager, Arc<ChannelSource>) {
    let source = Arc::new(ChannelSource::new());
    let manager = LifecycleManager::new(config, host)
        .unwrap()
        .with_source(source.clone());
    (manager, source)
}

pub fn id(s: &str) -> ExtensionId {
    ExtensionId::from(s)
}

/// Wait until `ext` reaches `expected`; `None` means the record is gone.
pub async fn wait_for_status(
    manager: &LifecycleManager,
    ext: &str,
    expected: Option<ExtensionStatus>,
) -> bool {
    let ext = &id(ext);
    eventually(Duration::from_secs(5), move || async move {
        manager.status(ext).await == expected
    })
    .await
}

/// Poll `check` until it returns true or `timeout` passes.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
