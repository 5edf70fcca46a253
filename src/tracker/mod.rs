//! Change tracker (C2): per-file session/version bookkeeping.
//!
//! Grounded on the `FileTracker` shape in the corpus's `file_tracker.rs`
//! (`HashMap<SessionId, HashSet<Path>>` reverse index plus
//! `HashMap<Path, Vec<Version>>` forward index) and the teacher's
//! bounded-collection conventions. Per spec, the tracker is not internally
//! synchronized — `&mut self` methods, with the conflict detector (C5)
//! serializing access through its mutex.

use std::collections::{HashMap, HashSet};

use crate::hash::Fingerprint;
use crate::path::NormalizedPath;
use crate::session::{InstanceId, SessionId};

/// One recorded snapshot of a tracked file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileVersion {
    /// Content fingerprint of this snapshot.
    pub hash: Fingerprint,
    /// Wall-clock moment this version was recorded, milliseconds since the
    /// Unix epoch.
    pub timestamp: u64,
    /// Session that produced this version (`"external"` for watcher-sourced
    /// writes).
    pub session_id: SessionId,
    /// Instance that produced this version.
    pub instance_id: InstanceId,
    /// Full text content, cached only if the file is non-binary and within
    /// the configured cache size. Required to later serve as a merge "ours"
    /// or base; a missing cache degrades merge quality, never correctness.
    pub content: Option<String>,
}

/// An entry in the change tracker: everything known about one path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackedFile {
    /// Normalized path, used as the map key.
    pub path: NormalizedPath,
    /// Original absolute path, used for disk I/O.
    pub absolute_path: std::path::PathBuf,
    /// Latest known content fingerprint.
    pub current_hash: Fingerprint,
    /// Sticky binary flag, set on first observation.
    pub is_binary: bool,
    /// Size in bytes of the current content.
    pub size: u64,
    /// Milliseconds since the Unix epoch of the last observed modification.
    pub last_modified: u64,
    /// Sessions that have read this file.
    pub readers: HashSet<SessionId>,
    /// Sessions that have written this file.
    pub writers: HashSet<SessionId>,
    /// Bounded ring of recorded versions, oldest first.
    pub versions: Vec<FileVersion>,
}

impl TrackedFile {
    /// `true` if no session currently references this file — eligible for
    /// removal.
    #[must_use]
    pub fn is_unreferenced(&self) -> bool {
        self.readers.is_empty() && self.writers.is_empty()
    }
}

/// Default cap on the number of versions kept per tracked file.
pub const DEFAULT_MAX_VERSIONS_PER_FILE: usize = 10;
/// Default cap on cached content size per version, in bytes.
pub const DEFAULT_MAX_CACHE_SIZE: u64 = 100 * 1024;

/// In-memory, per-process change tracker. Not internally synchronized —
/// callers (in practice, the conflict detector under its mutex) serialize
/// access.
///
/// `Clone` is used by the conflict detector's `get_tracker()` introspection
/// accessor to hand out a detached snapshot without holding the detector's
/// mutex for the caller's lifetime.
#[derive(Clone, Debug)]
pub struct FileChangeTracker {
    max_versions_per_file: usize,
    max_cache_size: u64,
    files: HashMap<NormalizedPath, TrackedFile>,
    session_files: HashMap<SessionId, HashSet<NormalizedPath>>,
}

impl FileChangeTracker {
    /// Create a tracker with the given history/cache limits.
    #[must_use]
    pub fn new(max_versions_per_file: usize, max_cache_size: u64) -> Self {
        Self {
            max_versions_per_file,
            max_cache_size,
            files: HashMap::new(),
            session_files: HashMap::new(),
        }
    }

    /// Compute a content fingerprint. Stable: equal bytes (or equal
    /// strings, by their UTF-8 encoding) always hash equal.
    #[must_use]
    pub fn compute_hash(content: &[u8]) -> Fingerprint {
        Fingerprint::of_bytes(content)
    }

    fn track_for_session(&mut self, session: &SessionId, path: &NormalizedPath) {
        self.session_files
            .entry(session.clone())
            .or_default()
            .insert(path.clone());
    }

    fn cacheable(&self, content: &str, is_binary: bool) -> bool {
        !is_binary && content.len() as u64 <= self.max_cache_size
    }

    fn append_version(&mut self, path: &NormalizedPath, version: FileVersion) {
        let Some(entry) = self.files.get_mut(path) else {
            return;
        };
        if entry.versions.last().is_some_and(|v| v.hash == version.hash) {
            return;
        }
        entry.versions.push(version);
        if entry.versions.len() > self.max_versions_per_file {
            entry.versions.remove(0);
        }
    }

    fn entry_or_insert(
        &mut self,
        path: &NormalizedPath,
        absolute_path: &std::path::Path,
        hash: &Fingerprint,
        is_binary: bool,
        size: u64,
        timestamp: u64,
    ) -> &mut TrackedFile {
        self.files.entry(path.clone()).or_insert_with(|| TrackedFile {
            path: path.clone(),
            absolute_path: absolute_path.to_path_buf(),
            current_hash: hash.clone(),
            is_binary,
            size,
            last_modified: timestamp,
            readers: HashSet::new(),
            writers: HashSet::new(),
            versions: Vec::new(),
        })
    }

    /// Record a read: insert or update the tracked file, add `session` to
    /// its readers, and append a version if `content` was supplied.
    #[allow(clippy::too_many_arguments)]
    pub fn register_read(
        &mut self,
        path: &NormalizedPath,
        absolute_path: &std::path::Path,
        session: &SessionId,
        instance: &InstanceId,
        hash: &Fingerprint,
        content: Option<&str>,
        is_binary: bool,
        size: u64,
        timestamp: u64,
    ) {
        let entry = self.entry_or_insert(path, absolute_path, hash, is_binary, size, timestamp);
        entry.current_hash = hash.clone();
        entry.size = size;
        entry.last_modified = timestamp;
        entry.readers.insert(session.clone());
        let is_binary = entry.is_binary;
        self.track_for_session(session, path);

        // Versions never carry content for binary files even if small
        // enough, and a binary write/read appends no version at all.
        if !is_binary && content.is_some() {
            let cached = content.filter(|c| self.cacheable(c, is_binary));
            self.append_version(
                path,
                FileVersion {
                    hash: hash.clone(),
                    timestamp,
                    session_id: session.clone(),
                    instance_id: instance.clone(),
                    content: cached.map(str::to_owned),
                },
            );
        }
    }

    /// Record a write: same as `register_read`, additionally marking
    /// `session` as a writer and updating `current_hash`.
    #[allow(clippy::too_many_arguments)]
    pub fn register_write(
        &mut self,
        path: &NormalizedPath,
        absolute_path: &std::path::Path,
        session: &SessionId,
        instance: &InstanceId,
        hash: &Fingerprint,
        content: Option<&str>,
        is_binary: bool,
        size: u64,
        timestamp: u64,
    ) {
        self.register_read(
            path,
            absolute_path,
            session,
            instance,
            hash,
            content,
            is_binary,
            size,
            timestamp,
        );
        if let Some(entry) = self.files.get_mut(path) {
            entry.writers.insert(session.clone());
            entry.current_hash = hash.clone();
        }
    }

    /// Return a reference to a tracked file, if any.
    #[must_use]
    pub fn get_tracked_file(&self, path: &NormalizedPath) -> Option<&TrackedFile> {
        self.files.get(path)
    }

    /// Best-effort common-ancestor lookup for a pending merge between two
    /// sessions: the oldest known version prior to both sessions' earliest
    /// recorded write, `versions[0]` as a fallback, or `None` if there is
    /// no history at all.
    ///
    /// This is a heuristic, not an optimal version-vector reconstruction —
    /// see spec's open question on common-base quality: the contract only
    /// requires returning *some* previously observed version.
    #[must_use]
    pub fn get_common_base(
        &self,
        path: &NormalizedPath,
        session_a: &SessionId,
        session_b: &SessionId,
    ) -> Option<&FileVersion> {
        let entry = self.files.get(path)?;
        if entry.versions.is_empty() {
            return None;
        }
        let earliest = |session: &SessionId| {
            entry
                .versions
                .iter()
                .filter(|v| &v.session_id == session)
                .map(|v| v.timestamp)
                .min()
        };
        let cutoff = match (earliest(session_a), earliest(session_b)) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        };
        if let Some(cutoff) = cutoff
            && let Some(v) = entry.versions.iter().rev().find(|v| v.timestamp < cutoff)
        {
            return Some(v);
        }
        entry.versions.first()
    }

    /// Exact-match lookup of a version by hash.
    #[must_use]
    pub fn get_version_by_hash<'a>(
        &'a self,
        path: &NormalizedPath,
        hash: &Fingerprint,
    ) -> Option<&'a FileVersion> {
        self.files
            .get(path)?
            .versions
            .iter()
            .find(|v| &v.hash == hash)
    }

    /// A copy of the version ring in insertion order.
    #[must_use]
    pub fn get_file_history(&self, path: &NormalizedPath) -> Vec<FileVersion> {
        self.files
            .get(path)
            .map(|f| f.versions.clone())
            .unwrap_or_default()
    }

    /// Remove `session` from all readers/writers; drop any file now
    /// unreferenced.
    pub fn unregister_session(&mut self, session: &SessionId) {
        let Some(paths) = self.session_files.remove(session) else {
            return;
        };
        for path in paths {
            if let Some(entry) = self.files.get_mut(&path) {
                entry.readers.remove(session);
                entry.writers.remove(session);
                if entry.is_unreferenced() {
                    self.files.remove(&path);
                }
            }
        }
    }

    /// Remove versions older than `cutoff_ms` (milliseconds since the Unix
    /// epoch). Returns the number of versions pruned.
    pub fn prune_old_versions(&mut self, cutoff_ms: u64) -> usize {
        let mut pruned = 0;
        for entry in self.files.values_mut() {
            let before = entry.versions.len();
            entry.versions.retain(|v| v.timestamp >= cutoff_ms);
            pruned += before - entry.versions.len();
        }
        pruned
    }

    /// Remove a tracked file entirely and purge it from per-session
    /// indices. Idempotent.
    pub fn untrack_file(&mut self, path: &NormalizedPath) {
        self.files.remove(path);
        for paths in self.session_files.values_mut() {
            paths.remove(path);
        }
    }

    /// The session's expected hash for a path is tracked by the caller
    /// (conflict detector); this accessor exists for diagnostics and
    /// assembling event payloads: every session that has ever read or
    /// written this path.
    #[must_use]
    pub fn sessions_for(&self, path: &NormalizedPath) -> Vec<SessionId> {
        let Some(entry) = self.files.get(path) else {
            return Vec::new();
        };
        entry.readers.union(&entry.writers).cloned().collect()
    }

    /// Number of currently tracked files. Diagnostics/tests only.
    #[must_use]
    pub fn tracked_file_count(&self) -> usize {
        self.files.len()
    }

    /// Number of sessions with at least one tracked path. Diagnostics/tests
    /// only.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.session_files.len()
    }
}

impl Default for FileChangeTracker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_VERSIONS_PER_FILE, DEFAULT_MAX_CACHE_SIZE)
    }
}
