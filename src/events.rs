//! The engine's event bus.
//!
//! `EventBus` wraps a [`tokio::sync::broadcast`] channel: best-effort,
//! multi-subscriber delivery that never blocks or errors the publishing
//! call. Publication from inside the C5 mutex is fire-and-forget — a lagged
//! or absent subscriber cannot stall a write.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::merge::MergeResult;
use crate::session::{InstanceId, SessionId};

/// Default channel capacity for a workspace's event bus.
const DEFAULT_CAPACITY: usize = 256;

/// The kind of change a `file.changed` event reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// A new file appeared.
    Add,
    /// A tracked file's content changed.
    Change,
    /// A tracked file was removed.
    Unlink,
}

/// Events published on a workspace's [`EventBus`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FileEvent {
    /// A file was successfully written, or a watcher-observed change was
    /// applied without conflict.
    Changed {
        /// Normalized path of the file.
        file_path: String,
        /// Absolute path of the file.
        absolute_path: PathBuf,
        /// What kind of change this was.
        change_type: ChangeType,
        /// The session that produced the change (`"external"` for
        /// watcher-sourced changes).
        session_id: SessionId,
        /// The instance that produced the change.
        instance_id: InstanceId,
        /// The new content hash, if the file still exists.
        hash: Option<String>,
        /// The hash prior to this change, if known.
        previous_hash: Option<String>,
        /// Milliseconds since the Unix epoch.
        timestamp: u64,
        /// Other sessions that have ever read or written this file.
        affected_sessions: Vec<SessionId>,
    },

    /// A conflict was created.
    Conflict {
        /// The new conflict's id.
        conflict_id: String,
        /// Normalized path of the conflicted file.
        file_path: String,
        /// Absolute path of the conflicted file.
        absolute_path: PathBuf,
        /// The conflict's kind.
        conflict_type: String,
        /// Sessions involved in the conflict.
        involved_sessions: Vec<SessionId>,
        /// The attempted merge's result.
        merge_result: MergeResult,
        /// Milliseconds since the Unix epoch.
        timestamp: u64,
    },

    /// A conflict was resolved.
    ConflictResolved {
        /// The resolved conflict's id.
        conflict_id: String,
        /// Normalized path of the file.
        file_path: String,
        /// How it was resolved.
        resolution: String,
        /// Who resolved it.
        resolved_by: SessionId,
        /// The resulting content hash.
        new_hash: String,
        /// Milliseconds since the Unix epoch.
        timestamp: u64,
    },
}

/// A best-effort, multi-subscriber event bus for one workspace.
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<FileEvent>,
}

impl EventBus {
    /// Create a new bus with the default channel capacity.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _receiver) = broadcast::channel(DEFAULT_CAPACITY);
        Self { sender }
    }

    /// Publish an event to all current subscribers. Never fails into the
    /// caller: if there are no subscribers, the event is simply dropped.
    pub fn publish(&self, event: FileEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<FileEvent> {
        self.sender.subscribe()
    }

    /// Current number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
