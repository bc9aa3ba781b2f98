//! Core extension types: identifiers, statuses, and filesystem change events.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Dotted identifier a host uses to address an extension, e.g. `cogs.admin.ban`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtensionId(String);

impl ExtensionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this identifier lives under the namespace `root_name`.
    pub fn is_under(&self, root_name: &str) -> bool {
        self.0
            .strip_prefix(root_name)
            .map(|rest| rest.starts_with('.'))
            .unwrap_or(false)
    }
}

impl fmt::Display for ExtensionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExtensionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ExtensionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for ExtensionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Load status tracked for each known extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtensionStatus {
    /// An unload failed; the host may or may not still hold the extension.
    Unknown,
    Unloaded,
    Loaded,
    /// The last load or reload failed.
    Failed,
}

impl fmt::Display for ExtensionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::Unloaded => "unloaded",
            Self::Loaded => "loaded",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Kind of filesystem change.
///
/// Declaration order is the sort order: `Added < Modified < Deleted`. Batches
/// are processed in descending order, so deletions run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
        };
        f.write_str(s)
    }
}

/// A single filesystem change under the watched root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FsEvent {
    pub kind: ChangeKind,
    pub path: PathBuf,
}

impl FsEvent {
    pub fn new(kind: ChangeKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    pub fn added(path: impl Into<PathBuf>) -> Self {
        Self::new(ChangeKind::Added, path)
    }

    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self::new(ChangeKind::Modified, path)
    }

    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        Self::new(ChangeKind::Deleted, path)
    }
}

/// Sort a batch in descending `(kind, path)` order, the order it is applied in.
pub fn order_batch(batch: &mut [FsEvent]) {
    batch.sort_by(|a, b| b.cmp(a));
}

/// Registry entry for one extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionRecord {
    pub id: ExtensionId,
    pub status: ExtensionStatus,
    /// When the status last changed
    pub updated_at: chrono::DateTime<chrono::Utc>,
    /// Message of the most recent failed transition, cleared on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl ExtensionRecord {
    pub fn new(id: ExtensionId, status: ExtensionStatus) -> Self {
        Self {
            id,
            status,
            updated_at: chrono::Utc::now(),
            last_error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_kind_order() {
        assert!(ChangeKind::Added < ChangeKind::Modified);
        assert!(ChangeKind::Modified < ChangeKind::Deleted);
    }

    #[test]
    fn test_order_batch_puts_deletes_first() {
        let mut batch = vec![
            FsEvent::added("cogs/a.rs"),
            FsEvent::deleted("cogs/a.rs"),
            FsEvent::modified("cogs/b.rs"),
        ];
        order_batch(&mut batch);
        assert_eq!(
            batch,
            vec![
                FsEvent::deleted("cogs/a.rs"),
                FsEvent::modified("cogs/b.rs"),
                FsEvent::added("cogs/a.rs"),
            ]
        );
    }

    #[test]
    fn test_is_under() {
        let id = ExtensionId::from("cogs.sub.ping");
        assert!(id.is_under("cogs"));
        assert!(!id.is_under("cog"));
        assert!(!ExtensionId::from("cogs").is_under("cogs"));
    }

    #[test]
    fn test_status_serialize() {
        let json = serde_json::to_string(&ExtensionStatus::Loaded).unwrap();
        assert_eq!(json, "\"loaded\"");
        assert_eq!(ExtensionStatus::Failed.to_string(), "failed");
    }
}
