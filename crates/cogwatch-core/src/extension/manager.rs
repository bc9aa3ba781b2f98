//! Extension lifecycle manager.
//!
//! The manager owns the [`StatusRegistry`], drives the host through
//! load/unload/reload transitions, and runs the watch loop that turns
//! filesystem changes into transitions. Host failures are recorded in the
//! registry and sent to the [`FailureReporter`]; they are never returned to
//! callers and never stop the watch loop.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::host::{DynHost, FailureReporter, HostError, HostOperation, LogReporter};
use super::path::{discover, identifier_from_path, is_extension_file};
use super::registry::StatusRegistry;
use super::types::{order_batch, ChangeKind, ExtensionId, ExtensionRecord, ExtensionStatus, FsEvent};
use super::watcher::{EventSource, NotifySource};
use crate::config::WatcherConfig;
use crate::error::{Error, Result};

/// Why a watch pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassEnd {
    Cancelled,
    RootVanished,
    /// The event stream closed while the root still exists.
    Closed,
}

/// Handle to a running watch loop.
pub struct WatchHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl WatchHandle {
    /// Ask the loop to stop. An in-flight host call is allowed to finish.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the loop and wait for it to exit.
    pub async fn shutdown(self) -> Result<()> {
        self.cancel.cancel();
        self.task.await?;
        Ok(())
    }
}

/// Hot-reload lifecycle manager for the extensions under one watched root.
///
/// Cheap to clone; clones share the registry, host and cancellation token.
#[derive(Clone)]
pub struct LifecycleManager {
    config: Arc<WatcherConfig>,
    host: DynHost,
    source: Arc<dyn EventSource>,
    reporter: Arc<dyn FailureReporter>,
    registry: Arc<StatusRegistry>,
    runtime: Option<Handle>,
    cancel: CancellationToken,
    /// Token of the watch loop currently running, if any
    watching: Arc<parking_lot::Mutex<Option<CancellationToken>>>,
}

impl LifecycleManager {
    /// Create a manager for `host`, watching the filesystem with `notify`.
    pub fn new(config: WatcherConfig, host: DynHost) -> Result<Self> {
        config.validate()?;
        let source = NotifySource::new(
            Duration::from_millis(config.debounce_ms),
            config.file_extension.clone(),
        );

        Ok(Self {
            config: Arc::new(config),
            host,
            source: Arc::new(source),
            reporter: Arc::new(LogReporter),
            registry: Arc::new(StatusRegistry::new()),
            runtime: None,
            cancel: CancellationToken::new(),
            watching: Arc::new(parking_lot::Mutex::new(None)),
        })
    }

    /// Use a different event source.
    pub fn with_source(mut self, source: Arc<dyn EventSource>) -> Self {
        self.source = source;
        self
    }

    /// Send host failures to `reporter` instead of the log.
    pub fn with_reporter(mut self, reporter: Arc<dyn FailureReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Spawn the watch loop on `runtime` instead of the current runtime.
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Absolute path of the watched root.
    pub fn root_dir(&self) -> PathBuf {
        self.config.root_dir()
    }

    /// Stop the watch loop and any pending wait for the root.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    // ========================================================================
    // Startup
    // ========================================================================

    /// Wait for the root, scan it, reconcile with the host, preload if
    /// configured, then spawn the watch loop.
    ///
    /// Returns `None` when the debug gate keeps the loop from running or the
    /// manager was cancelled before the root appeared. Calling `start` again
    /// never re-registers or reloads extensions that are already known, and
    /// the new loop replaces the one already running, so every change is
    /// applied once.
    pub async fn start(&self) -> Option<WatchHandle> {
        if !self.wait_for_root(&self.cancel).await {
            return None;
        }
        self.sync().await;

        if !self.config.should_watch() {
            info!("Debug gate is closed; not watching {:?}", self.root_dir());
            return None;
        }

        let cancel = self.cancel.child_token();
        if let Some(previous) = self.watching.lock().replace(cancel.clone()) {
            debug!("Replacing the running watch loop");
            previous.cancel();
        }

        info!("Watching for file changes in {:?}...", self.root_dir());
        let manager = self.clone();
        let loop_cancel = cancel.clone();
        let task = match &self.runtime {
            Some(runtime) => runtime.spawn(manager.watch_loop(loop_cancel)),
            None => tokio::spawn(manager.watch_loop(loop_cancel)),
        };

        Some(WatchHandle { cancel, task })
    }

    /// Block until the root exists, backing off exponentially between checks.
    ///
    /// Returns false if cancelled first.
    async fn wait_for_root(&self, cancel: &CancellationToken) -> bool {
        let root = self.root_dir();
        let max = Duration::from_millis(self.config.root_poll_max_ms.max(1));
        let mut delay = Duration::from_millis(self.config.root_poll_initial_ms.max(1)).min(max);
        let mut reported = false;

        loop {
            if root.is_dir() {
                info!("Found {:?}!", root);
                return true;
            }
            if !reported {
                error!("{}", Error::RootNotFound(root.clone()));
                reported = true;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return false,
                _ = tokio::time::sleep(delay) => {}
            }
            delay = (delay * 2).min(max);
        }
    }

    /// Scan the root, reconcile with the host, and preload if configured.
    async fn sync(&self) {
        let discovered = match discover(
            &self.root_dir(),
            self.config.root_name(),
            &self.config.file_extension,
        ) {
            Ok(discovered) => discovered,
            Err(e) => {
                warn!("Scan of {:?} failed: {}", self.root_dir(), e);
                Vec::new()
            }
        };

        let mut registered = 0;
        for (_, id) in &discovered {
            if self.registry.register(id).await {
                registered += 1;
            }
        }
        debug!(
            discovered = discovered.len(),
            registered, "Scanned {:?}", self.root_dir()
        );

        self.reconcile().await;

        if self.config.preload {
            self.preload().await;
        }
    }

    /// Bring the registry in line with what the host actually holds.
    ///
    /// Host-loaded extensions in the root's namespace become LOADED without a
    /// load call; records marked LOADED that the host no longer holds become
    /// UNLOADED.
    pub async fn reconcile(&self) {
        let held = self.host.loaded_extensions().await;
        let root_name = self.config.root_name();

        for id in &held {
            if !id.is_under(root_name) && !self.registry.contains(id).await {
                continue;
            }
            let _guard = self.registry.lock(id).await;
            if self.registry.status(id).await != Some(ExtensionStatus::Loaded) {
                self.registry.set_status(id, ExtensionStatus::Loaded).await;
                debug!(extension = %id, "Reconciled as loaded");
            }
        }

        for id in self.registry.ids_with_status(ExtensionStatus::Loaded).await {
            if held.contains(&id) {
                continue;
            }
            let _guard = self.registry.lock(&id).await;
            self.registry.set_status(&id, ExtensionStatus::Unloaded).await;
            debug!(extension = %id, "Reconciled as unloaded");
        }
    }

    /// Load every registered extension that is still UNLOADED.
    async fn preload(&self) {
        info!("Preloading...");
        for id in self.registry.ids_with_status(ExtensionStatus::Unloaded).await {
            self.load_id(&id).await;
        }
    }

    // ========================================================================
    // Watch loop
    // ========================================================================

    async fn watch_loop(self, cancel: CancellationToken) {
        let root = self.root_dir();

        loop {
            if cancel.is_cancelled() {
                break;
            }

            match self.watch_pass(&root, &cancel).await {
                PassEnd::Cancelled => break,
                PassEnd::RootVanished => {
                    warn!("Lost {:?}; waiting for it to come back", root);
                    if !self.wait_for_root(&cancel).await {
                        break;
                    }
                    self.sync().await;
                    info!("Watching for file changes in {:?}...", root);
                }
                PassEnd::Closed => {
                    let delay = Duration::from_millis(self.config.restart_delay_ms);
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        info!("Stopped watching {:?}", root);
    }

    async fn watch_pass(&self, root: &Path, cancel: &CancellationToken) -> PassEnd {
        if !root.is_dir() {
            return PassEnd::RootVanished;
        }

        let mut events = match self.source.subscribe(root).await {
            Ok(events) => events,
            Err(Error::RootNotFound(_)) | Err(Error::RootVanished(_)) => {
                return PassEnd::RootVanished
            }
            Err(e) => {
                error!("Cannot watch {:?}: {}", root, e);
                return PassEnd::Closed;
            }
        };

        loop {
            let item = tokio::select! {
                biased;
                _ = cancel.cancelled() => return PassEnd::Cancelled,
                item = events.recv() => item,
            };

            match item {
                None => return PassEnd::Closed,
                Some(Err(Error::RootVanished(_))) | Some(Err(Error::RootNotFound(_))) => {
                    return PassEnd::RootVanished
                }
                Some(Err(e)) if e.is_recoverable() => warn!("Event source error: {}", e),
                Some(Err(e)) => {
                    error!("Event source failed: {}", e);
                    return PassEnd::Closed;
                }
                Some(Ok(batch)) => {
                    if !root.is_dir() {
                        return PassEnd::RootVanished;
                    }
                    if !self.apply_batch(batch, cancel).await {
                        return PassEnd::Cancelled;
                    }
                }
            }
        }
    }

    /// Apply a batch of filesystem changes.
    ///
    /// The batch is applied in descending `(kind, path)` order, so a delete and
    /// an add of the same file in one batch leave the extension loaded.
    /// Returns false if cancellation stopped the batch part way.
    pub async fn handle_batch(&self, batch: Vec<FsEvent>) -> bool {
        self.apply_batch(batch, &self.cancel).await
    }

    async fn apply_batch(&self, mut batch: Vec<FsEvent>, cancel: &CancellationToken) -> bool {
        order_batch(&mut batch);

        for event in &batch {
            if cancel.is_cancelled() {
                return false;
            }
            self.handle_event(event).await;
        }
        true
    }

    async fn handle_event(&self, event: &FsEvent) {
        if !is_extension_file(&event.path, &self.config.file_extension) {
            self.handle_directory_event(event).await;
            return;
        }

        let id = match identifier_from_path(&event.path, self.config.root_name()) {
            Ok(id) => id,
            Err(e) => {
                error!("Ignoring {} event for {:?}: {}", event.kind, event.path, e);
                return;
            }
        };
        debug!(extension = %id, change = %event.kind, "File change");
        self.apply_change(event.kind, &id).await;
    }

    /// Expand a directory change into changes for the extensions beneath it.
    ///
    /// A removed directory no longer exists on disk, so its extensions are
    /// found by identifier prefix in the registry and the host.
    async fn handle_directory_event(&self, event: &FsEvent) {
        let root_name = self.config.root_name();

        match event.kind {
            ChangeKind::Deleted => {
                let prefix = match identifier_from_path(&event.path, root_name) {
                    Ok(prefix) => prefix,
                    Err(e) => {
                        debug!("Ignoring removal of {:?}: {}", event.path, e);
                        return;
                    }
                };

                let mut ids: BTreeSet<ExtensionId> = self
                    .registry
                    .list()
                    .await
                    .into_iter()
                    .map(|r| r.id)
                    .filter(|id| id.is_under(prefix.as_str()))
                    .collect();
                ids.extend(
                    self.host
                        .loaded_extensions()
                        .await
                        .into_iter()
                        .filter(|id| id.is_under(prefix.as_str())),
                );

                if !ids.is_empty() {
                    info!(directory = %prefix, count = ids.len(), "Directory removed");
                }
                for id in &ids {
                    self.apply_change(ChangeKind::Deleted, id).await;
                }
            }
            ChangeKind::Added => {
                if !event.path.is_dir() {
                    return;
                }
                let found = match discover(&event.path, root_name, &self.config.file_extension) {
                    Ok(found) => found,
                    Err(e) => {
                        debug!("Ignoring new directory {:?}: {}", event.path, e);
                        return;
                    }
                };
                for (_, id) in &found {
                    self.apply_change(ChangeKind::Added, id).await;
                }
            }
            ChangeKind::Modified => {}
        }
    }

    async fn apply_change(&self, kind: ChangeKind, id: &ExtensionId) {
        let _guard = self.registry.lock(id).await;
        match kind {
            ChangeKind::Deleted => {
                if self.host.is_loaded(id).await {
                    self.unload_locked(id, true).await;
                } else if self.registry.remove(id).await.is_some() {
                    info!(extension = %id, "Extension dropped");
                }
            }
            ChangeKind::Added => {
                self.load_locked(id).await;
            }
            ChangeKind::Modified => {
                if self.host.is_loaded(id).await {
                    self.reload_locked(id).await;
                } else {
                    self.load_locked(id).await;
                }
            }
        }
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// Load the extension defined by the file at `path`.
    ///
    /// Only path translation can fail; host failures are recorded instead.
    pub async fn load(&self, path: impl AsRef<Path>) -> Result<ExtensionStatus> {
        let id = self.identifier(path)?;
        Ok(self.load_id(&id).await)
    }

    /// Unload the extension defined by the file at `path`.
    ///
    /// Returns the resulting status, or `None` if the record was removed.
    pub async fn unload(
        &self,
        path: impl AsRef<Path>,
        remove: bool,
    ) -> Result<Option<ExtensionStatus>> {
        let id = self.identifier(path)?;
        Ok(self.unload_id(&id, remove).await)
    }

    /// Reload the extension defined by the file at `path`.
    pub async fn reload(&self, path: impl AsRef<Path>) -> Result<ExtensionStatus> {
        let id = self.identifier(path)?;
        Ok(self.reload_id(&id).await)
    }

    pub async fn load_id(&self, id: &ExtensionId) -> ExtensionStatus {
        let _guard = self.registry.lock(id).await;
        self.load_locked(id).await
    }

    pub async fn unload_id(&self, id: &ExtensionId, remove: bool) -> Option<ExtensionStatus> {
        let _guard = self.registry.lock(id).await;
        self.unload_locked(id, remove).await
    }

    pub async fn reload_id(&self, id: &ExtensionId) -> ExtensionStatus {
        let _guard = self.registry.lock(id).await;
        self.reload_locked(id).await
    }

    /// Translate a path under the root into an identifier.
    pub fn identifier(&self, path: impl AsRef<Path>) -> Result<ExtensionId> {
        identifier_from_path(path, self.config.root_name())
    }

    async fn load_locked(&self, id: &ExtensionId) -> ExtensionStatus {
        self.registry.register(id).await;
        debug!(extension = %id, "Loading extension");

        match self.host.load_extension(id).await {
            Ok(()) => {
                self.registry.set_status(id, ExtensionStatus::Loaded).await;
                info!(extension = %id, "Extension loaded");
                ExtensionStatus::Loaded
            }
            Err(HostError::AlreadyLoaded(_)) => {
                self.registry.set_status(id, ExtensionStatus::Loaded).await;
                debug!(extension = %id, "Extension already loaded");
                ExtensionStatus::Loaded
            }
            Err(e) => self.fail(HostOperation::Load, id, e).await,
        }
    }

    async fn unload_locked(&self, id: &ExtensionId, remove: bool) -> Option<ExtensionStatus> {
        debug!(extension = %id, remove, "Unloading extension");

        match self.host.unload_extension(id).await {
            Ok(()) | Err(HostError::NotFound(_)) => {
                info!(extension = %id, "Extension unloaded");
                if remove {
                    self.registry.remove(id).await;
                    None
                } else {
                    self.registry.set_status(id, ExtensionStatus::Unloaded).await;
                    Some(ExtensionStatus::Unloaded)
                }
            }
            Err(e) => Some(self.fail(HostOperation::Unload, id, e).await),
        }
    }

    async fn reload_locked(&self, id: &ExtensionId) -> ExtensionStatus {
        self.registry.register(id).await;
        debug!(extension = %id, "Reloading extension");

        match self.host.reload_extension(id).await {
            Ok(()) => {
                self.registry.set_status(id, ExtensionStatus::Loaded).await;
                info!(extension = %id, "Extension reloaded");
                ExtensionStatus::Loaded
            }
            Err(e) => self.fail(HostOperation::Reload, id, e).await,
        }
    }

    /// Record a failed transition and report it.
    async fn fail(
        &self,
        operation: HostOperation,
        id: &ExtensionId,
        error: HostError,
    ) -> ExtensionStatus {
        // An unload failure leaves the host state indeterminate.
        let status = match operation {
            HostOperation::Unload => ExtensionStatus::Unknown,
            HostOperation::Load | HostOperation::Reload => ExtensionStatus::Failed,
        };
        self.registry
            .set_failure(id, status, error.to_string())
            .await;
        self.reporter.report(operation, id, &error);
        status
    }

    // ========================================================================
    // Observability
    // ========================================================================

    /// Snapshot of every known extension, ordered by identifier.
    pub async fn list_statuses(&self) -> Vec<ExtensionRecord> {
        self.registry.list().await
    }

    pub async fn status(&self, id: &ExtensionId) -> Option<ExtensionStatus> {
        self.registry.status(id).await
    }
}

/// Build a manager with the default `notify` source and start it.
pub async fn watch(
    host: DynHost,
    config: WatcherConfig,
) -> Result<(LifecycleManager, Option<WatchHandle>)> {
    let manager = LifecycleManager::new(config, host)?;
    let handle = manager.start().await;
    Ok((manager, handle))
}
