//! Status registry for watched extensions.
//!
//! The registry provides:
//! - One [`ExtensionRecord`] per known identifier, ordered by identifier
//! - Per-identifier transition locks so transitions on one extension never overlap

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use super::types::{ExtensionId, ExtensionRecord, ExtensionStatus};

/// Registry of extension statuses, keyed by identifier.
#[derive(Default)]
pub struct StatusRegistry {
    /// Known extensions
    records: RwLock<BTreeMap<ExtensionId, ExtensionRecord>>,
    /// Transition locks, created on first use
    locks: parking_lot::Mutex<HashMap<ExtensionId, Arc<Mutex<()>>>>,
}

impl StatusRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an extension as UNLOADED. Returns false if it was already known.
    pub async fn register(&self, id: &ExtensionId) -> bool {
        let mut records = self.records.write().await;
        if records.contains_key(id) {
            return false;
        }
        records.insert(
            id.clone(),
            ExtensionRecord::new(id.clone(), ExtensionStatus::Unloaded),
        );
        true
    }

    /// Record a successful transition, clearing any previous error.
    pub async fn set_status(&self, id: &ExtensionId, status: ExtensionStatus) {
        let mut records = self.records.write().await;
        let record = records
            .entry(id.clone())
            .or_insert_with(|| ExtensionRecord::new(id.clone(), status));
        record.status = status;
        record.updated_at = chrono::Utc::now();
        record.last_error = None;
    }

    /// Record a failed transition.
    pub async fn set_failure(&self, id: &ExtensionId, status: ExtensionStatus, error: String) {
        let mut records = self.records.write().await;
        let record = records
            .entry(id.clone())
            .or_insert_with(|| ExtensionRecord::new(id.clone(), status));
        record.status = status;
        record.updated_at = chrono::Utc::now();
        record.last_error = Some(error);
    }

    /// Drop an extension from the registry.
    pub async fn remove(&self, id: &ExtensionId) -> Option<ExtensionRecord> {
        self.records.write().await.remove(id)
    }

    /// Get an extension's record.
    pub async fn get(&self, id: &ExtensionId) -> Option<ExtensionRecord> {
        self.records.read().await.get(id).cloned()
    }

    /// Get an extension's status.
    pub async fn status(&self, id: &ExtensionId) -> Option<ExtensionStatus> {
        self.records.read().await.get(id).map(|r| r.status)
    }

    /// Snapshot of every record, ordered by identifier.
    pub async fn list(&self) -> Vec<ExtensionRecord> {
        self.records.read().await.values().cloned().collect()
    }

    /// Identifiers currently in `status`.
    pub async fn ids_with_status(&self, status: ExtensionStatus) -> Vec<ExtensionId> {
        self.records
            .read()
            .await
            .values()
            .filter(|r| r.status == status)
            .map(|r| r.id.clone())
            .collect()
    }

    /// Get the number of known extensions.
    pub async fn count(&self) -> usize {
        self.records.read().await.len()
    }

    /// Check if an extension is known.
    pub async fn contains(&self, id: &ExtensionId) -> bool {
        self.records.read().await.contains_key(id)
    }

    /// Acquire the transition lock for `id`, waiting for any transition in flight.
    pub async fn lock(&self, id: &ExtensionId) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .lock()
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_registry_creation() {
        let registry = StatusRegistry::new();
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let registry = StatusRegistry::new();
        let id = ExtensionId::from("cogs.ping");

        assert!(registry.register(&id).await);
        registry.set_status(&id, ExtensionStatus::Loaded).await;
        assert!(!registry.register(&id).await);
        assert_eq!(registry.status(&id).await, Some(ExtensionStatus::Loaded));
    }

    #[tokio::test]
    async fn test_failure_then_success_clears_error() {
        let registry = StatusRegistry::new();
        let id = ExtensionId::from("cogs.ping");

        registry
            .set_failure(&id, ExtensionStatus::Failed, "boom".to_string())
            .await;
        let record = registry.get(&id).await.unwrap();
        assert_eq!(record.status, ExtensionStatus::Failed);
        assert_eq!(record.last_error.as_deref(), Some("boom"));

        registry.set_status(&id, ExtensionStatus::Loaded).await;
        assert_eq!(registry.get(&id).await.unwrap().last_error, None);
    }

    #[tokio::test]
    async fn test_list_is_ordered() {
        let registry = StatusRegistry::new();
        for id in ["cogs.z", "cogs.a", "cogs.m"] {
            registry.register(&ExtensionId::from(id)).await;
        }
        let ids: Vec<String> = registry
            .list()
            .await
            .into_iter()
            .map(|r| r.id.to_string())
            .collect();
        assert_eq!(ids, vec!["cogs.a", "cogs.m", "cogs.z"]);
    }

    #[tokio::test]
    async fn test_lock_serializes_same_id() {
        let registry = Arc::new(StatusRegistry::new());
        let id = ExtensionId::from("cogs.ping");

        let guard = registry.lock(&id).await;
        let other = {
            let registry = registry.clone();
            let id = id.clone();
            tokio::spawn(async move {
                let _guard = registry.lock(&id).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!other.is_finished());

        // A different identifier is not blocked.
        let _unrelated = registry.lock(&ExtensionId::from("cogs.other")).await;

        drop(guard);
        other.await.unwrap();
    }
}
