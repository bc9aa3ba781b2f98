//! In-memory extension host.
//!
//! Keeps the set of "loaded" identifiers in memory and never executes any
//! code. Used by the CLI dry-run mode and by tests, which can inject failures
//! and inspect the calls the manager made.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::RwLock;

use super::host::{ExtensionHost, HostError, HostOperation};
use super::types::ExtensionId;

/// A recorded host call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostCall {
    pub operation: HostOperation,
    pub id: ExtensionId,
}

struct InjectedFailure {
    error: HostError,
    sticky: bool,
}

/// Host that tracks loaded extensions in a set.
#[derive(Default)]
pub struct MemoryHost {
    loaded: RwLock<BTreeSet<ExtensionId>>,
    failures: Mutex<HashMap<(HostOperation, ExtensionId), InjectedFailure>>,
    calls: Mutex<Vec<HostCall>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a host that already holds `ids`, as if loaded before the manager started.
    pub fn with_loaded<I, T>(ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ExtensionId>,
    {
        Self {
            loaded: RwLock::new(ids.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Make the next `operation` on `id` fail with `error`.
    pub fn fail_next(&self, operation: HostOperation, id: impl Into<ExtensionId>, error: HostError) {
        self.failures.lock().insert(
            (operation, id.into()),
            InjectedFailure {
                error,
                sticky: false,
            },
        );
    }

    /// Make every `operation` on `id` fail with `error` until cleared.
    pub fn fail_always(
        &self,
        operation: HostOperation,
        id: impl Into<ExtensionId>,
        error: HostError,
    ) {
        self.failures.lock().insert(
            (operation, id.into()),
            InjectedFailure {
                error,
                sticky: true,
            },
        );
    }

    pub fn clear_failures(&self) {
        self.failures.lock().clear();
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().clone()
    }

    /// Number of `operation` calls made for `id`.
    pub fn call_count(&self, operation: HostOperation, id: &ExtensionId) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.operation == operation && &c.id == id)
            .count()
    }

    fn record(&self, operation: HostOperation, id: &ExtensionId) -> Result<(), HostError> {
        self.calls.lock().push(HostCall {
            operation,
            id: id.clone(),
        });

        let mut failures = self.failures.lock();
        let key = (operation, id.clone());
        let sticky = match failures.get(&key) {
            Some(injected) => injected.sticky,
            None => return Ok(()),
        };
        let error = if sticky {
            failures.get(&key).map(|i| i.error.clone())
        } else {
            failures.remove(&key).map(|i| i.error)
        };
        error.map_or(Ok(()), Err)
    }
}

#[async_trait]
impl ExtensionHost for MemoryHost {
    async fn load_extension(&self, id: &ExtensionId) -> Result<(), HostError> {
        self.record(HostOperation::Load, id)?;

        let mut loaded = self.loaded.write().await;
        if !loaded.insert(id.clone()) {
            return Err(HostError::AlreadyLoaded(id.clone()));
        }
        tracing::debug!(extension = %id, "Memory host loaded extension");
        Ok(())
    }

    async fn unload_extension(&self, id: &ExtensionId) -> Result<(), HostError> {
        self.record(HostOperation::Unload, id)?;

        if !self.loaded.write().await.remove(id) {
            return Err(HostError::NotFound(id.clone()));
        }
        tracing::debug!(extension = %id, "Memory host unloaded extension");
        Ok(())
    }

    async fn reload_extension(&self, id: &ExtensionId) -> Result<(), HostError> {
        self.record(HostOperation::Reload, id)?;

        if !self.loaded.read().await.contains(id) {
            return Err(HostError::NotFound(id.clone()));
        }
        tracing::debug!(extension = %id, "Memory host reloaded extension");
        Ok(())
    }

    async fn loaded_extensions(&self) -> Vec<ExtensionId> {
        self.loaded.read().await.iter().cloned().collect()
    }

    async fn is_loaded(&self, id: &ExtensionId) -> bool {
        self.loaded.read().await.contains(id)
    }
}
