//! Conflict detector (C5): the orchestrator.
//!
//! Holds C1 (binary detection, via [`crate::binary`]), C2 (the tracker), C3
//! (the merge service), C4 (the watcher), and an event bus, and mediates
//! every session read/write through a single per-workspace mutex — the one
//! place tracker state and disk are mutated together. Grounded on the
//! teacher's `workspace.rs` in its role as the thing that owns and
//! sequences the other components, generalized from "one git workspace" to
//! "one watched, multi-session file tree".

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::binary::is_binary;
use crate::config::EngineConfig;
use crate::error::CoordError;
use crate::events::{ChangeType, EventBus, FileEvent};
use crate::fs_trait::{Filesystem, TokioFilesystem};
use crate::hash::Fingerprint;
use crate::merge::{merge, MergeResult};
use crate::path::NormalizedPath;
use crate::session::{InstanceId, SessionId};
use crate::tracker::FileChangeTracker;
use crate::watcher::{ChangeKind, DetectedBy, FileChangeEvent, FsWatcher};

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// What kind of disagreement a [`Conflict`] represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConflictKind {
    /// Two sessions wrote the same file without observing each other's
    /// change.
    ConcurrentWrite,
    /// A process outside the engine changed a file a session had read.
    ExternalChange,
    /// A merge attempt itself produced conflicts (reserved for callers that
    /// invoke the merge service directly and want to record the result).
    MergeConflict,
}

impl ConflictKind {
    /// The wire/event string for this kind, matching spec.md's literal
    /// `concurrent-write` / `external-change` / `merge-conflict` values.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConcurrentWrite => "concurrent-write",
            Self::ExternalChange => "external-change",
            Self::MergeConflict => "merge-conflict",
        }
    }
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a [`Conflict`] was, or should be, resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// Use the merge service's automatic result.
    AutoMerged,
    /// Keep the requesting session's own cached content.
    KeepOurs,
    /// Keep whatever is currently on disk.
    KeepTheirs,
    /// Use caller-supplied content verbatim.
    Manual,
}

impl Resolution {
    #[must_use]
    fn as_str(self) -> &'static str {
        match self {
            Self::AutoMerged => "auto-merged",
            Self::KeepOurs => "keep-ours",
            Self::KeepTheirs => "keep-theirs",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One session's stake in a conflict, captured at conflict-creation time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvolvedSession {
    /// The session.
    pub session_id: SessionId,
    /// The instance that produced the involved version.
    pub instance_id: InstanceId,
    /// The content hash this session is associated with.
    pub hash: Fingerprint,
    /// When this session's involvement was recorded, milliseconds since the
    /// Unix epoch.
    pub timestamp: u64,
}

/// A recorded disagreement over one file's content. At most one is active
/// per absolute path at a time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Conflict {
    /// Unique id, a UUIDv4.
    pub conflict_id: String,
    /// Normalized path of the conflicted file.
    pub file_path: NormalizedPath,
    /// Absolute path, used for disk I/O during resolution.
    pub absolute_path: PathBuf,
    /// When the conflict was created, milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// What kind of disagreement this is.
    pub kind: ConflictKind,
    /// Sessions whose versions are in contention.
    pub involved_sessions: Vec<InvolvedSession>,
    /// The merge service's attempt at reconciling the two sides.
    pub merge_result: MergeResult,
    /// Whether the underlying content is binary (merge could not auto-run).
    pub is_binary: bool,
}

/// Result of [`ConflictDetector::register_read`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadResult {
    /// The current content hash.
    pub hash: Fingerprint,
    /// The content read, if the file is not binary.
    pub content: Option<String>,
}

/// Result of [`ConflictDetector::register_write`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteOutcome {
    /// `true` iff the write was accepted with no conflict.
    pub success: bool,
    /// The hash of the content this call attempted to write.
    pub hash: Fingerprint,
    /// The conflict created, if any.
    pub conflict: Option<Conflict>,
}

/// Result of [`ConflictDetector::resolve_conflict`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolveOutcome {
    /// `true` iff the conflict was resolved.
    pub success: bool,
    /// The resulting content hash, if successful.
    pub new_hash: Option<Fingerprint>,
    /// A human-readable error, if unsuccessful.
    pub error: Option<String>,
}

/// A stateless handle onto the merge service, matching spec.md's named
/// `getMerger()` accessor. The merge algorithm itself carries no state;
/// this exists purely so callers can reach it through the detector.
#[derive(Clone, Copy, Debug, Default)]
pub struct Merger;

impl Merger {
    /// Run a three-way merge. See [`crate::merge::merge`].
    #[must_use]
    pub fn merge(self, base: &str, ours: &str, theirs: &str) -> MergeResult {
        merge(base, ours, theirs)
    }
}

struct DetectorState {
    tracker: FileChangeTracker,
    conflicts: std::collections::HashMap<String, Conflict>,
    conflicts_by_path: std::collections::HashMap<NormalizedPath, String>,
    session_expected_hash:
        std::collections::HashMap<SessionId, std::collections::HashMap<NormalizedPath, Fingerprint>>,
}

impl DetectorState {
    fn new(max_versions_per_file: usize, max_cache_size: u64) -> Self {
        Self {
            tracker: FileChangeTracker::new(max_versions_per_file, max_cache_size),
            conflicts: std::collections::HashMap::new(),
            conflicts_by_path: std::collections::HashMap::new(),
            session_expected_hash: std::collections::HashMap::new(),
        }
    }

    /// Insert `conflict`, first evicting whatever conflict was previously
    /// active for its path. At most one active conflict per path may exist
    /// at a time; a fresh disagreement supersedes a stale, unresolved one
    /// rather than stacking up behind it.
    fn replace_conflict_for_path(&mut self, conflict: Conflict) {
        if let Some(stale_id) = self.conflicts_by_path.get(&conflict.file_path).cloned() {
            self.conflicts.remove(&stale_id);
        }
        self.conflicts_by_path.insert(conflict.file_path.clone(), conflict.conflict_id.clone());
        self.conflicts.insert(conflict.conflict_id.clone(), conflict);
    }
}

/// The conflict detector: one per workspace root. Mediates session
/// reads/writes, consumes watcher events, creates and resolves conflicts,
/// and publishes events on its bus.
pub struct ConflictDetector<FS: Filesystem = TokioFilesystem> {
    fs: FS,
    max_versions_per_file: usize,
    max_cache_size: u64,
    state: Mutex<DetectorState>,
    events: EventBus,
    watcher: FsWatcher,
}

impl ConflictDetector<TokioFilesystem> {
    /// Create a detector over `root` backed by the real filesystem.
    ///
    /// # Errors
    /// Returns an error if the watcher's ignore patterns are invalid.
    pub fn new(root: PathBuf, config: &EngineConfig) -> Result<Self, CoordError> {
        Self::with_filesystem(root, config, TokioFilesystem)
    }
}

impl<FS: Filesystem> ConflictDetector<FS> {
    /// Create a detector over `root` backed by a custom [`Filesystem`]
    /// (used by tests to swap in [`crate::fs_trait::MemFilesystem`]).
    ///
    /// # Errors
    /// Returns an error if the watcher's ignore patterns are invalid.
    pub fn with_filesystem(root: PathBuf, config: &EngineConfig, fs: FS) -> Result<Self, CoordError> {
        let watcher = FsWatcher::new(root, &config.watcher.ignore, config.watcher.debounce_ms)?;
        Ok(Self {
            fs,
            max_versions_per_file: config.tracker.max_versions_per_file,
            max_cache_size: config.tracker.max_cache_size,
            state: Mutex::new(DetectorState::new(
                config.tracker.max_versions_per_file,
                config.tracker.max_cache_size,
            )),
            events: EventBus::new(),
            watcher,
        })
    }

    /// Start the underlying watcher and wire its events into
    /// [`Self::handle_file_change`]. Requires `Arc` since the watcher's
    /// handler outlives this call and must hold only a weak reference to
    /// avoid a reference cycle.
    ///
    /// # Errors
    /// Returns an error if the watcher fails to start.
    pub async fn start(self: &Arc<Self>) -> Result<(), CoordError>
    where
        FS: 'static,
    {
        let weak = Arc::downgrade(self);
        self.watcher.subscribe(move |event: &FileChangeEvent| {
            let Some(this) = weak.upgrade() else {
                return;
            };
            let event = event.clone();
            tokio::spawn(async move {
                this.handle_file_change(event).await;
            });
        });
        self.watcher.start().await
    }

    /// Stop the underlying watcher.
    pub async fn stop(&self) {
        self.watcher.stop().await;
    }

    /// Reset all in-memory state: tracker, conflicts, expected hashes.
    /// Testing-only, per spec.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        *state = DetectorState::new(self.max_versions_per_file, self.max_cache_size);
    }

    /// Remove `session` from all tracked readers/writers and its
    /// expected-hash entries.
    pub async fn unregister_session(&self, session: &SessionId) {
        let mut state = self.state.lock().await;
        state.tracker.unregister_session(session);
        state.session_expected_hash.remove(session);
    }

    /// Read `absolute_path` from disk, record the read, and return its hash
    /// and (if textual) content.
    ///
    /// # Errors
    /// Returns [`CoordError::IoRead`] if the underlying read fails.
    pub async fn register_read(
        &self,
        path: &NormalizedPath,
        absolute_path: &Path,
        session: &SessionId,
        instance: &InstanceId,
    ) -> Result<ReadResult, CoordError> {
        let bytes = self
            .fs
            .read_file(absolute_path)
            .await
            .map_err(|source| CoordError::IoRead {
                path: absolute_path.to_path_buf(),
                source,
            })?;
        let detection = is_binary(&bytes, Some(absolute_path));
        let hash = Fingerprint::of_bytes(&bytes);
        let content = (!detection.is_binary).then(|| String::from_utf8_lossy(&bytes).into_owned());
        let size = bytes.len() as u64;
        let timestamp = now_ms();

        let mut state = self.state.lock().await;
        state.tracker.register_read(
            path,
            absolute_path,
            session,
            instance,
            &hash,
            content.as_deref(),
            detection.is_binary,
            size,
            timestamp,
        );
        state
            .session_expected_hash
            .entry(session.clone())
            .or_default()
            .insert(path.clone(), hash.clone());

        Ok(ReadResult { hash, content })
    }

    /// Record a session's write of `content`, already present on disk at
    /// `absolute_path`. Detects a concurrent-write conflict if the tracker's
    /// current hash has moved past what this session last observed.
    #[allow(clippy::too_many_lines)]
    pub async fn register_write(
        &self,
        path: &NormalizedPath,
        absolute_path: &Path,
        session: &SessionId,
        instance: &InstanceId,
        content: &str,
        expected_hash: Option<&Fingerprint>,
    ) -> WriteOutcome {
        let detection = is_binary(content.as_bytes(), Some(absolute_path));
        let new_hash = Fingerprint::of_text(content);
        let timestamp = now_ms();

        let mut state = self.state.lock().await;
        let tracked = state.tracker.get_tracked_file(path).cloned();
        let session_expected = state
            .session_expected_hash
            .get(session)
            .and_then(|m| m.get(path))
            .cloned();
        let check = expected_hash.cloned().or(session_expected);

        let conflicting = tracked
            .as_ref()
            .zip(check.as_ref())
            .is_some_and(|(t, c)| t.current_hash != *c);

        if conflicting {
            let tracked = tracked.expect("checked above");
            let theirs = match self.fs.read_file(absolute_path).await {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(_source) => {
                    return WriteOutcome {
                        success: false,
                        hash: new_hash,
                        conflict: None,
                    };
                }
            };
            let base = tracked
                .versions
                .first()
                .and_then(|v| v.content.clone())
                .unwrap_or_default();
            let merge_result = merge(&base, content, &theirs);

            let conflict_id = uuid::Uuid::new_v4().to_string();
            let mut involved = vec![InvolvedSession {
                session_id: session.clone(),
                instance_id: instance.clone(),
                hash: new_hash.clone(),
                timestamp,
            }];
            if let Some(last) = tracked.versions.last()
                && &last.session_id != session
            {
                involved.push(InvolvedSession {
                    session_id: last.session_id.clone(),
                    instance_id: last.instance_id.clone(),
                    hash: last.hash.clone(),
                    timestamp: last.timestamp,
                });
            }

            let conflict = Conflict {
                conflict_id: conflict_id.clone(),
                file_path: path.clone(),
                absolute_path: absolute_path.to_path_buf(),
                timestamp,
                kind: ConflictKind::ConcurrentWrite,
                involved_sessions: involved.clone(),
                merge_result: merge_result.clone(),
                is_binary: detection.is_binary,
            };
            state.replace_conflict_for_path(conflict.clone());
            drop(state);

            self.events.publish(FileEvent::Conflict {
                conflict_id,
                file_path: path.as_str().to_owned(),
                absolute_path: absolute_path.to_path_buf(),
                conflict_type: ConflictKind::ConcurrentWrite.as_str().to_owned(),
                involved_sessions: involved.into_iter().map(|i| i.session_id).collect(),
                merge_result,
                timestamp,
            });

            return WriteOutcome {
                success: false,
                hash: new_hash,
                conflict: Some(conflict),
            };
        }

        let previous_hash = tracked.as_ref().map(|t| t.current_hash.as_str().to_owned());
        let cache_content = (!detection.is_binary).then_some(content);
        state.tracker.register_write(
            path,
            absolute_path,
            session,
            instance,
            &new_hash,
            cache_content,
            detection.is_binary,
            content.len() as u64,
            timestamp,
        );
        state
            .session_expected_hash
            .entry(session.clone())
            .or_default()
            .insert(path.clone(), new_hash.clone());
        let affected_sessions = state.tracker.sessions_for(path);
        drop(state);

        self.events.publish(FileEvent::Changed {
            file_path: path.as_str().to_owned(),
            absolute_path: absolute_path.to_path_buf(),
            change_type: ChangeType::Change,
            session_id: session.clone(),
            instance_id: instance.clone(),
            hash: Some(new_hash.as_str().to_owned()),
            previous_hash,
            timestamp,
            affected_sessions,
        });

        WriteOutcome {
            success: true,
            hash: new_hash,
            conflict: None,
        }
    }

    /// Handle one watcher-sourced (or manually injected) change event.
    /// Manually injected (`agent-report`) events are skipped — the
    /// originating `register_write` call already handled bookkeeping.
    ///
    /// `rename` events are translated here: if the path still exists on
    /// disk it is treated as a `change`, otherwise as an `unlink` — see
    /// `DESIGN.md` for the rationale (spec.md leaves rename handling as an
    /// open question).
    #[allow(clippy::too_many_lines)]
    pub async fn handle_file_change(&self, event: FileChangeEvent) {
        if event.detected_by == DetectedBy::AgentReport {
            return;
        }

        let path = event.path.clone();
        let absolute_path = event.absolute_path.clone();
        let timestamp = event.timestamp;

        let effective_kind = match event.change_type {
            ChangeKind::Rename => {
                if self.fs.stat(&absolute_path).await.is_ok() {
                    ChangeKind::Change
                } else {
                    ChangeKind::Unlink
                }
            }
            other => other,
        };

        let mut state = self.state.lock().await;
        let Some(tracked) = state.tracker.get_tracked_file(&path).cloned() else {
            return;
        };
        if tracked.readers.is_empty() && tracked.writers.is_empty() {
            return;
        }

        if effective_kind == ChangeKind::Unlink {
            let affected: Vec<SessionId> = tracked.readers.union(&tracked.writers).cloned().collect();
            state.tracker.untrack_file(&path);
            drop(state);
            self.events.publish(FileEvent::Changed {
                file_path: path.as_str().to_owned(),
                absolute_path,
                change_type: ChangeType::Unlink,
                session_id: SessionId::external(),
                instance_id: InstanceId::new("watcher"),
                hash: None,
                previous_hash: Some(tracked.current_hash.as_str().to_owned()),
                timestamp,
                affected_sessions: affected,
            });
            return;
        }

        let bytes = match self.fs.read_file(&absolute_path).await {
            Ok(bytes) => bytes,
            Err(error) => {
                tracing::warn!(
                    path = %absolute_path.display(),
                    %error,
                    "failed to read file while handling a watcher change"
                );
                return;
            }
        };
        let new_hash = Fingerprint::of_bytes(&bytes);
        if new_hash == tracked.current_hash {
            return;
        }
        let detection = is_binary(&bytes, Some(&absolute_path));
        let content = (!detection.is_binary).then(|| String::from_utf8_lossy(&bytes).into_owned());

        let conflicting_sessions: Vec<SessionId> = tracked
            .readers
            .iter()
            .filter(|reader| {
                state
                    .session_expected_hash
                    .get(*reader)
                    .and_then(|m| m.get(&path))
                    .is_some_and(|expected| *expected != new_hash)
            })
            .cloned()
            .collect();

        if let Some(first) = conflicting_sessions.first() {
            let expected_hash = state
                .session_expected_hash
                .get(first)
                .and_then(|m| m.get(&path))
                .cloned();
            let cached = expected_hash
                .as_ref()
                .and_then(|h| state.tracker.get_version_by_hash(&path, h))
                .filter(|v| v.content.is_some())
                .cloned();

            if let Some(cached) = cached {
                let ours = cached.content.clone().unwrap_or_default();
                let theirs = content.clone().unwrap_or_default();
                let base = tracked
                    .versions
                    .first()
                    .and_then(|v| v.content.clone())
                    .unwrap_or_default();
                let merge_result = merge(&base, &ours, &theirs);

                let conflict_id = uuid::Uuid::new_v4().to_string();
                let involved_sessions = vec![InvolvedSession {
                    session_id: first.clone(),
                    instance_id: cached.instance_id.clone(),
                    hash: cached.hash.clone(),
                    timestamp: cached.timestamp,
                }];
                let conflict = Conflict {
                    conflict_id: conflict_id.clone(),
                    file_path: path.clone(),
                    absolute_path: absolute_path.clone(),
                    timestamp,
                    kind: ConflictKind::ExternalChange,
                    involved_sessions: involved_sessions.clone(),
                    merge_result: merge_result.clone(),
                    is_binary: detection.is_binary,
                };
                state.replace_conflict_for_path(conflict);
                drop(state);

                self.events.publish(FileEvent::Conflict {
                    conflict_id,
                    file_path: path.as_str().to_owned(),
                    absolute_path,
                    conflict_type: ConflictKind::ExternalChange.as_str().to_owned(),
                    involved_sessions: involved_sessions.into_iter().map(|i| i.session_id).collect(),
                    merge_result,
                    timestamp,
                });
                return;
            }
        }

        let affected = state.tracker.sessions_for(&path);
        let previous_hash = tracked.current_hash.as_str().to_owned();
        state.tracker.register_write(
            &path,
            &absolute_path,
            &SessionId::external(),
            &InstanceId::new("watcher"),
            &new_hash,
            content.as_deref(),
            detection.is_binary,
            bytes.len() as u64,
            timestamp,
        );
        drop(state);

        self.events.publish(FileEvent::Changed {
            file_path: path.as_str().to_owned(),
            absolute_path,
            change_type: ChangeType::Change,
            session_id: SessionId::external(),
            instance_id: InstanceId::new("watcher"),
            hash: Some(new_hash.as_str().to_owned()),
            previous_hash: Some(previous_hash),
            timestamp,
            affected_sessions: affected,
        });
    }

    /// Resolve an active conflict, writing the chosen content to disk and
    /// restoring consistent tracker state.
    #[allow(clippy::too_many_lines)]
    pub async fn resolve_conflict(
        &self,
        conflict_id: &str,
        resolution: Resolution,
        resolved_by: &SessionId,
        content: Option<String>,
    ) -> ResolveOutcome {
        let mut state = self.state.lock().await;
        let Some(conflict) = state.conflicts.get(conflict_id).cloned() else {
            let err = CoordError::NotFound {
                what: "conflict".to_owned(),
                id: conflict_id.to_owned(),
            };
            return ResolveOutcome {
                success: false,
                new_hash: None,
                error: Some(err.to_string()),
            };
        };

        let resolved_content = match resolution {
            Resolution::AutoMerged => {
                if conflict.merge_result.can_auto_merge {
                    conflict.merge_result.merged.clone()
                } else {
                    let err = if conflict.is_binary {
                        CoordError::BinaryUnmergeable {
                            path: conflict.absolute_path.clone(),
                        }
                    } else {
                        CoordError::Precondition {
                            detail: "auto-merged requested but the merge could not auto-merge".to_owned(),
                        }
                    };
                    return ResolveOutcome {
                        success: false,
                        new_hash: None,
                        error: Some(err.to_string()),
                    };
                }
            }
            Resolution::KeepOurs => {
                let Some(session_entry) = conflict
                    .involved_sessions
                    .iter()
                    .find(|s| !s.session_id.is_external())
                else {
                    let err = CoordError::Precondition {
                        detail: "no non-external involved session to take 'ours' from".to_owned(),
                    };
                    return ResolveOutcome {
                        success: false,
                        new_hash: None,
                        error: Some(err.to_string()),
                    };
                };
                let cached = state
                    .tracker
                    .get_version_by_hash(&conflict.file_path, &session_entry.hash)
                    .and_then(|v| v.content.clone());
                let Some(cached) = cached else {
                    let err = CoordError::Precondition {
                        detail: "no cached content available for keep-ours".to_owned(),
                    };
                    return ResolveOutcome {
                        success: false,
                        new_hash: None,
                        error: Some(err.to_string()),
                    };
                };
                cached
            }
            Resolution::KeepTheirs => match self.fs.read_file(&conflict.absolute_path).await {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(source) => {
                    let err = CoordError::IoRead {
                        path: conflict.absolute_path.clone(),
                        source,
                    };
                    return ResolveOutcome {
                        success: false,
                        new_hash: None,
                        error: Some(err.to_string()),
                    };
                }
            },
            Resolution::Manual => {
                let Some(content) = content else {
                    let err = CoordError::Precondition {
                        detail: "manual resolution requires content".to_owned(),
                    };
                    return ResolveOutcome {
                        success: false,
                        new_hash: None,
                        error: Some(err.to_string()),
                    };
                };
                content
            }
        };

        if let Err(source) = self
            .fs
            .write_file(&conflict.absolute_path, resolved_content.as_bytes())
            .await
        {
            let err = CoordError::IoWrite {
                path: conflict.absolute_path.clone(),
                source,
            };
            return ResolveOutcome {
                success: false,
                new_hash: None,
                error: Some(err.to_string()),
            };
        }

        let new_hash = Fingerprint::of_text(&resolved_content);
        let timestamp = now_ms();
        state.tracker.register_write(
            &conflict.file_path,
            &conflict.absolute_path,
            resolved_by,
            &InstanceId::resolution(),
            &new_hash,
            Some(&resolved_content),
            conflict.is_binary,
            resolved_content.len() as u64,
            timestamp,
        );

        for involved in &conflict.involved_sessions {
            if !involved.session_id.is_external() {
                state
                    .session_expected_hash
                    .entry(involved.session_id.clone())
                    .or_default()
                    .insert(conflict.file_path.clone(), new_hash.clone());
            }
        }
        state
            .session_expected_hash
            .entry(resolved_by.clone())
            .or_default()
            .insert(conflict.file_path.clone(), new_hash.clone());

        state.conflicts.remove(conflict_id);
        state.conflicts_by_path.remove(&conflict.file_path);
        drop(state);

        self.events.publish(FileEvent::ConflictResolved {
            conflict_id: conflict_id.to_owned(),
            file_path: conflict.file_path.as_str().to_owned(),
            resolution: resolution.as_str().to_owned(),
            resolved_by: resolved_by.clone(),
            new_hash: new_hash.as_str().to_owned(),
            timestamp,
        });

        ResolveOutcome {
            success: true,
            new_hash: Some(new_hash),
            error: None,
        }
    }

    /// All currently active conflicts.
    pub async fn get_active_conflicts(&self) -> Vec<Conflict> {
        self.state.lock().await.conflicts.values().cloned().collect()
    }

    /// Look up a conflict by id.
    pub async fn get_conflict(&self, conflict_id: &str) -> Option<Conflict> {
        self.state.lock().await.conflicts.get(conflict_id).cloned()
    }

    /// Look up the active conflict for a path, if any.
    pub async fn get_conflict_by_path(&self, path: &NormalizedPath) -> Option<Conflict> {
        let state = self.state.lock().await;
        let id = state.conflicts_by_path.get(path)?;
        state.conflicts.get(id).cloned()
    }

    /// A detached snapshot of the tracker's current state.
    pub async fn get_tracker(&self) -> FileChangeTracker {
        self.state.lock().await.tracker.clone()
    }

    /// A handle onto the (stateless) merge service.
    #[must_use]
    pub fn get_merger(&self) -> Merger {
        Merger
    }

    /// The underlying filesystem watcher.
    #[must_use]
    pub fn get_watcher(&self) -> &FsWatcher {
        &self.watcher
    }

    /// Subscribe to this workspace's event bus.
    #[must_use]
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<FileEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_trait::MemFilesystem;

    fn detector(fs: MemFilesystem) -> ConflictDetector<MemFilesystem> {
        let config = EngineConfig::default();
        ConflictDetector::with_filesystem(PathBuf::from("/ws"), &config, fs).unwrap()
    }

    fn sid(s: &str) -> SessionId {
        SessionId::new(s).unwrap()
    }

    fn npath(s: &str) -> NormalizedPath {
        NormalizedPath::new(Path::new(s))
    }

    #[tokio::test]
    async fn register_read_caches_content_and_expected_hash() {
        let fs = MemFilesystem::new();
        fs.seed("/ws/a.txt", b"hello".to_vec());
        let detector = detector(fs);
        let result = detector
            .register_read(&npath("a.txt"), Path::new("/ws/a.txt"), &sid("s1"), &InstanceId::new("i1"))
            .await
            .unwrap();
        assert_eq!(result.content.as_deref(), Some("hello"));
        assert_eq!(result.hash, Fingerprint::of_text("hello"));
    }

    #[tokio::test]
    async fn concurrent_write_detection() {
        let fs = MemFilesystem::new();
        fs.seed("/ws/foo.txt", b"base".to_vec());
        let detector = detector(fs);
        let path = npath("foo.txt");
        let abs = Path::new("/ws/foo.txt");

        let h0 = detector
            .register_read(&path, abs, &sid("s1"), &InstanceId::new("i1"))
            .await
            .unwrap()
            .hash;
        detector
            .register_read(&path, abs, &sid("s2"), &InstanceId::new("i1"))
            .await
            .unwrap();

        let outcome = detector
            .register_write(&path, abs, &sid("s2"), &InstanceId::new("i1"), "s2-wrote-this", None)
            .await;
        assert!(outcome.success);

        let outcome = detector
            .register_write(&path, abs, &sid("s1"), &InstanceId::new("i1"), "s1-wrote-this", Some(&h0))
            .await;
        assert!(!outcome.success);
        assert!(outcome.conflict.is_some());
        assert_eq!(
            outcome.conflict.unwrap().kind,
            ConflictKind::ConcurrentWrite
        );
    }

    #[tokio::test]
    async fn a_second_conflict_on_the_same_path_replaces_the_first() {
        let fs = MemFilesystem::new();
        fs.seed("/ws/foo.txt", b"base".to_vec());
        let detector = detector(fs);
        let path = npath("foo.txt");
        let abs = Path::new("/ws/foo.txt");

        let h0 = detector
            .register_read(&path, abs, &sid("s1"), &InstanceId::new("i1"))
            .await
            .unwrap()
            .hash;
        detector
            .register_read(&path, abs, &sid("s2"), &InstanceId::new("i1"))
            .await
            .unwrap();
        detector
            .register_read(&path, abs, &sid("s3"), &InstanceId::new("i1"))
            .await
            .unwrap();

        detector
            .register_write(&path, abs, &sid("s2"), &InstanceId::new("i1"), "s2 version", None)
            .await;

        // s1's write races against its now-stale h0: produces conflict A.
        let first = detector
            .register_write(&path, abs, &sid("s1"), &InstanceId::new("i1"), "s1 version", Some(&h0))
            .await;
        let conflict_a = first.conflict.expect("expected conflict A");
        assert_eq!(detector.get_active_conflicts().await.len(), 1);

        // Before A is resolved, s3 races against the same stale h0: produces
        // conflict B for the same path, which must supersede A rather than
        // stack up behind it.
        let second = detector
            .register_write(&path, abs, &sid("s3"), &InstanceId::new("i1"), "s3 version", Some(&h0))
            .await;
        let conflict_b = second.conflict.expect("expected conflict B");
        assert_ne!(conflict_a.conflict_id, conflict_b.conflict_id);

        let active = detector.get_active_conflicts().await;
        assert_eq!(active.len(), 1, "only one conflict may be active per path");
        assert_eq!(active[0].conflict_id, conflict_b.conflict_id);
        assert!(detector.get_conflict(&conflict_a.conflict_id).await.is_none());
        assert_eq!(
            detector.get_conflict_by_path(&path).await.unwrap().conflict_id,
            conflict_b.conflict_id
        );
    }

    #[tokio::test]
    async fn no_conflict_write_updates_expected_hash() {
        let fs = MemFilesystem::new();
        fs.seed("/ws/a.txt", b"base".to_vec());
        let detector = detector(fs);
        let path = npath("a.txt");
        let abs = Path::new("/ws/a.txt");

        detector
            .register_read(&path, abs, &sid("s1"), &InstanceId::new("i1"))
            .await
            .unwrap();
        let outcome = detector
            .register_write(&path, abs, &sid("s1"), &InstanceId::new("i1"), "new content", None)
            .await;
        assert!(outcome.success);

        let tracker = detector.get_tracker().await;
        let tracked = tracker.get_tracked_file(&path).unwrap();
        assert_eq!(tracked.current_hash, outcome.hash);
    }

    #[tokio::test]
    async fn resolve_conflict_manual_restores_consistency() {
        let fs = MemFilesystem::new();
        fs.seed("/ws/foo.txt", b"base".to_vec());
        let detector = detector(fs);
        let path = npath("foo.txt");
        let abs = Path::new("/ws/foo.txt");

        let h0 = detector
            .register_read(&path, abs, &sid("s1"), &InstanceId::new("i1"))
            .await
            .unwrap()
            .hash;
        detector
            .register_read(&path, abs, &sid("s2"), &InstanceId::new("i1"))
            .await
            .unwrap();
        detector
            .register_write(&path, abs, &sid("s2"), &InstanceId::new("i1"), "s2 version", None)
            .await;
        let outcome = detector
            .register_write(&path, abs, &sid("s1"), &InstanceId::new("i1"), "s1 version", Some(&h0))
            .await;
        let conflict = outcome.conflict.unwrap();

        let resolve = detector
            .resolve_conflict(
                &conflict.conflict_id,
                Resolution::Manual,
                &sid("s1"),
                Some("merged-by-hand".to_owned()),
            )
            .await;
        assert!(resolve.success);
        assert_eq!(resolve.new_hash, Some(Fingerprint::of_text("merged-by-hand")));
        assert!(detector.get_conflict(&conflict.conflict_id).await.is_none());
        assert!(detector.get_conflict_by_path(&path).await.is_none());

        let tracker = detector.get_tracker().await;
        assert_eq!(
            tracker.get_tracked_file(&path).unwrap().current_hash,
            Fingerprint::of_text("merged-by-hand")
        );
    }

    #[tokio::test]
    async fn resolve_conflict_unknown_id_errors() {
        let fs = MemFilesystem::new();
        let detector = detector(fs);
        let resolve = detector
            .resolve_conflict("missing", Resolution::Manual, &sid("s1"), Some("x".to_owned()))
            .await;
        assert!(!resolve.success);
        assert!(resolve.error.is_some());
    }

    #[tokio::test]
    async fn external_change_becomes_conflict() {
        let fs = MemFilesystem::new();
        fs.seed("/ws/foo.txt", b"base".to_vec());
        let detector = detector(fs);
        let path = npath("foo.txt");
        let abs = PathBuf::from("/ws/foo.txt");

        detector
            .register_read(&path, &abs, &sid("s1"), &InstanceId::new("i1"))
            .await
            .unwrap();

        // simulate an external editor overwriting the file
        detector
            .fs
            .write_file(&abs, b"externally changed")
            .await
            .unwrap();

        detector
            .handle_file_change(FileChangeEvent {
                change_type: ChangeKind::Change,
                path: path.clone(),
                absolute_path: abs,
                timestamp: 1,
                size: None,
                detected_by: DetectedBy::Watcher,
            })
            .await;

        let conflict = detector.get_conflict_by_path(&path).await;
        assert!(conflict.is_some());
        assert_eq!(conflict.unwrap().kind, ConflictKind::ExternalChange);
    }

    #[tokio::test]
    async fn agent_report_events_are_skipped() {
        let fs = MemFilesystem::new();
        fs.seed("/ws/foo.txt", b"base".to_vec());
        let detector = detector(fs);
        let path = npath("foo.txt");
        let abs = PathBuf::from("/ws/foo.txt");
        detector
            .register_read(&path, &abs, &sid("s1"), &InstanceId::new("i1"))
            .await
            .unwrap();

        detector
            .handle_file_change(FileChangeEvent {
                change_type: ChangeKind::Change,
                path: path.clone(),
                absolute_path: abs,
                timestamp: 1,
                size: None,
                detected_by: DetectedBy::AgentReport,
            })
            .await;

        assert!(detector.get_conflict_by_path(&path).await.is_none());
    }
}
