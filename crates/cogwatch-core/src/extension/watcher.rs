//! Filesystem event sources.
//!
//! An [`EventSource`] turns a watched root into a stream of event batches.
//! [`NotifySource`] is the default, backed by the platform watcher from
//! `notify` and debounced so a burst of writes arrives as one batch.

use std::collections::{BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use super::path::{is_extension_file, may_be_directory};
use super::types::FsEvent;
use crate::error::{Error, Result};

/// Receiving end of a subscription.
///
/// Yields `Err(Error::RootVanished)` when the root disappears; the
/// subscription is finished after that item.
pub type EventReceiver = mpsc::Receiver<Result<Vec<FsEvent>>>;

/// A restartable source of filesystem event batches.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Open a fresh subscription for everything under `root`.
    async fn subscribe(&self, root: &Path) -> Result<EventReceiver>;
}

/// Event source backed by `notify`.
#[derive(Debug, Clone)]
pub struct NotifySource {
    /// Quiet period that closes a batch
    debounce: Duration,
    /// Only files with this extension produce events
    file_extension: String,
}

impl NotifySource {
    pub fn new(debounce: Duration, file_extension: impl Into<String>) -> Self {
        Self {
            debounce,
            file_extension: file_extension.into(),
        }
    }
}

#[async_trait]
impl EventSource for NotifySource {
    async fn subscribe(&self, root: &Path) -> Result<EventReceiver> {
        if !root.is_dir() {
            return Err(Error::RootNotFound(root.to_path_buf()));
        }

        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = raw_tx.send(res);
            },
            notify::Config::default(),
        )?;
        watcher.watch(root, RecursiveMode::Recursive)?;
        tracing::debug!("Subscribed to filesystem events under {:?}", root);

        let (batch_tx, batch_rx) = mpsc::channel(16);
        let root = root.to_path_buf();
        let debounce = self.debounce;
        let file_extension = self.file_extension.clone();

        tokio::spawn(async move {
            // Dropping the watcher ends the raw stream.
            let _watcher = watcher;

            loop {
                let first = tokio::select! {
                    _ = batch_tx.closed() => break,
                    raw = raw_rx.recv() => match raw {
                        Some(raw) => raw,
                        None => break,
                    },
                };

                let mut raw_events = vec![first];
                while let Ok(Some(raw)) = tokio::time::timeout(debounce, raw_rx.recv()).await {
                    raw_events.push(raw);
                }

                let mut batch = BTreeSet::new();
                let mut root_removed = false;
                for raw in raw_events {
                    match raw {
                        Ok(event) => {
                            if matches!(event.kind, EventKind::Remove(_))
                                && event.paths.iter().any(|p| p == &root)
                            {
                                root_removed = true;
                            }
                            batch.extend(translate_event(&event, &file_extension));
                        }
                        Err(e) => tracing::warn!("File watcher error: {}", e),
                    }
                }

                if root_removed || !root.exists() {
                    tracing::warn!("Watched root {:?} vanished", root);
                    let _ = batch_tx.send(Err(Error::RootVanished(root.clone()))).await;
                    break;
                }

                if batch.is_empty() {
                    continue;
                }
                if batch_tx.send(Ok(batch.into_iter().collect())).await.is_err() {
                    break;
                }
            }

            tracing::debug!("Event source for {:?} stopped", root);
        });

        Ok(batch_rx)
    }
}

/// Event source fed by the application instead of the filesystem.
///
/// Each call to [`ChannelSource::open`] queues one subscription and returns
/// its sender; [`EventSource::subscribe`] hands the queued subscriptions out
/// in order. Useful for hosts that already run their own watcher.
#[derive(Default)]
pub struct ChannelSource {
    pending: parking_lot::Mutex<VecDeque<EventReceiver>>,
}

impl ChannelSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a subscription and return the sender that feeds it.
    pub fn open(&self) -> mpsc::Sender<Result<Vec<FsEvent>>> {
        let (tx, rx) = mpsc::channel(64);
        self.pending.lock().push_back(rx);
        tx
    }
}

#[async_trait]
impl EventSource for ChannelSource {
    async fn subscribe(&self, root: &Path) -> Result<EventReceiver> {
        self.pending
            .lock()
            .pop_front()
            .ok_or_else(|| Error::Watch(format!("no subscription queued for {}", root.display())))
    }
}

/// Map one raw `notify` event onto extension file changes.
///
/// Created, removed and renamed directories are passed through as well; the
/// manager expands them into changes for the extensions they contain.
pub fn translate_event(event: &Event, file_extension: &str) -> Vec<FsEvent> {
    let file = |p: &PathBuf| is_extension_file(p, file_extension);
    let file_or_dir = |p: &PathBuf| file(p) || may_be_directory(p);

    match &event.kind {
        EventKind::Create(_) => event
            .paths
            .iter()
            .filter(|p| file_or_dir(p))
            .map(FsEvent::added)
            .collect(),
        EventKind::Remove(_) => event
            .paths
            .iter()
            .filter(|p| file_or_dir(p))
            .map(FsEvent::deleted)
            .collect(),
        EventKind::Modify(ModifyKind::Name(mode)) => {
            let mut events = Vec::new();
            for (index, path) in event.paths.iter().enumerate() {
                if !file_or_dir(path) {
                    continue;
                }
                let removed = match mode {
                    RenameMode::From => true,
                    RenameMode::To => false,
                    // Both carries [from, to]
                    RenameMode::Both => index == 0,
                    _ => !path.exists(),
                };
                events.push(if removed {
                    FsEvent::deleted(path)
                } else {
                    FsEvent::added(path)
                });
            }
            events
        }
        EventKind::Modify(_) => event
            .paths
            .iter()
            .filter(|p| file(p))
            .map(FsEvent::modified)
            .collect(),
        _ => Vec::new(),
    }
}
