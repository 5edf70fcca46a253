//! Filesystem watcher (C4).
//!
//! Grounded on `arctic-hen7-starling`'s `FsEngine` (notify + debounce +
//! queued writes, with the watcher callback only ever pushing onto a
//! channel — never touching shared state directly) and the corpus's common
//! `notify` + `notify-debouncer-full` pairing (`paddo-tech-tether-cli`).
//! Ignore-pattern matching reuses the teacher's `glob` dependency
//! (`glob::Pattern`, already used in `workspace/merge.rs` and
//! `merge/build_phase.rs` for driver match-globs) rather than adding
//! `globset`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use notify::RecursiveMode;
use notify_debouncer_full::{new_debouncer, DebounceEventResult, Debouncer, RecommendedCache};
use tokio::sync::{mpsc, Mutex};

use crate::error::CoordError;
use crate::path::NormalizedPath;

/// The kind of filesystem change an event reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    /// A new path appeared.
    Add,
    /// A tracked path's content changed.
    Change,
    /// A path was removed.
    Unlink,
    /// A path was renamed. The orchestrator (C5) is responsible for
    /// translating this into an `unlink` + `add` pair, or migrating
    /// tracker entries across paths — see spec's open question on rename
    /// handling, resolved in `DESIGN.md`.
    Rename,
}

/// Who observed the change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectedBy {
    /// Observed by the filesystem watcher itself.
    Watcher,
    /// Manually injected via [`FsWatcher::report_change`]. The conflict
    /// detector uses this tag to skip re-handling of its own writes.
    AgentReport,
}

/// One filesystem change, either watcher-observed or manually injected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileChangeEvent {
    /// What kind of change this is.
    pub change_type: ChangeKind,
    /// Normalized path of the changed file.
    pub path: NormalizedPath,
    /// Absolute path of the changed file.
    pub absolute_path: PathBuf,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Size in bytes, if known.
    pub size: Option<u64>,
    /// Who observed this change.
    pub detected_by: DetectedBy,
}

/// The watcher's lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatcherState {
    /// Not watching.
    Stopped,
    /// Setting up the underlying watcher.
    Starting,
    /// Watching and delivering events.
    Ready,
    /// Tearing down the underlying watcher.
    Stopping,
}

/// An opaque handle returned from [`FsWatcher::subscribe`], used to
/// unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Box<dyn Fn(&FileChangeEvent) + Send + Sync>;

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Watches a workspace root recursively, emitting debounced, write-
/// stabilized [`FileChangeEvent`]s to subscribers.
pub struct FsWatcher {
    root: PathBuf,
    ignore: Vec<glob::Pattern>,
    debounce_ms: u64,
    state: Arc<Mutex<WatcherState>>,
    handlers: Arc<std::sync::Mutex<Vec<(SubscriptionId, Handler)>>>,
    next_sub_id: AtomicU64,
    debouncer: Mutex<Option<Debouncer<notify::RecommendedWatcher, RecommendedCache>>>,
    dispatch_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl FsWatcher {
    /// Create a new watcher over `root`. Does not start watching until
    /// [`FsWatcher::start`] is called.
    ///
    /// # Errors
    /// Returns an error if any `ignore_globs` entry is not a valid glob
    /// pattern.
    pub fn new(root: PathBuf, ignore_globs: &[String], debounce_ms: u64) -> Result<Self, CoordError> {
        let ignore = ignore_globs
            .iter()
            .map(|g| {
                glob::Pattern::new(g).map_err(|e| CoordError::Watcher {
                    detail: format!("invalid ignore pattern '{g}': {e}"),
                    source: None,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            root,
            ignore,
            debounce_ms,
            state: Arc::new(Mutex::new(WatcherState::Stopped)),
            handlers: Arc::new(std::sync::Mutex::new(Vec::new())),
            next_sub_id: AtomicU64::new(0),
            debouncer: Mutex::new(None),
            dispatch_task: Mutex::new(None),
        })
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> WatcherState {
        *self.state.lock().await
    }

    fn is_ignored(&self, absolute_path: &Path) -> bool {
        let relative = absolute_path.strip_prefix(&self.root).unwrap_or(absolute_path);
        self.ignore
            .iter()
            .any(|pattern| pattern.matches_path(relative) || pattern.matches_path(absolute_path))
    }

    /// Add a handler, invoked for every non-ignored event. Handler panics
    /// are caught and logged at `warn`; one faulty handler does not block
    /// others.
    pub fn subscribe(&self, handler: impl Fn(&FileChangeEvent) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_sub_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.lock().unwrap().push((id, Box::new(handler)));
        id
    }

    /// Remove a previously registered handler.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.handlers.lock().unwrap().retain(|(h_id, _)| *h_id != id);
    }

    fn dispatch(handlers: &std::sync::Mutex<Vec<(SubscriptionId, Handler)>>, event: &FileChangeEvent) {
        for (_, handler) in handlers.lock().unwrap().iter() {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler(event)));
            if result.is_err() {
                tracing::warn!("filesystem watcher handler panicked");
            }
        }
    }

    /// Start watching. A no-op (logs a warning) if already running.
    ///
    /// # Errors
    /// Returns an error if the underlying watcher cannot be set up.
    #[tracing::instrument(skip(self))]
    pub async fn start(&self) -> Result<(), CoordError> {
        let mut state = self.state.lock().await;
        if *state != WatcherState::Stopped {
            tracing::warn!(?state, "watcher already running, start() is a no-op");
            return Ok(());
        }
        *state = WatcherState::Starting;
        drop(state);

        let (tx, mut rx) = mpsc::unbounded_channel::<FileChangeEvent>();
        let ignore_root = self.root.clone();

        let mut debouncer = new_debouncer(
            Duration::from_millis(self.debounce_ms),
            None,
            move |result: DebounceEventResult| match result {
                Ok(events) => {
                    for event in events {
                        for path in &event.event.paths {
                            let Some(kind) = classify(&event.event.kind) else {
                                continue;
                            };
                            let relative = path.strip_prefix(&ignore_root).unwrap_or(path);
                            let _ = tx.send(FileChangeEvent {
                                change_type: kind,
                                path: NormalizedPath::new(relative),
                                absolute_path: path.clone(),
                                timestamp: now_ms(),
                                size: None,
                                detected_by: DetectedBy::Watcher,
                            });
                        }
                    }
                }
                Err(errors) => {
                    for error in errors {
                        tracing::warn!(%error, "filesystem watcher error");
                    }
                }
            },
        )
        .map_err(CoordError::from)?;

        debouncer
            .watcher()
            .watch(&self.root, RecursiveMode::Recursive)
            .map_err(CoordError::from)?;

        *self.debouncer.lock().await = Some(debouncer);

        let handlers = Arc::clone(&self.handlers);
        let ignore = self.ignore.clone();
        let watch_root = self.root.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let relative = event.absolute_path.strip_prefix(&watch_root).unwrap_or(&event.absolute_path);
                if ignore.iter().any(|p| p.matches_path(relative) || p.matches_path(&event.absolute_path)) {
                    continue;
                }
                Self::dispatch(&handlers, &event);
            }
        });
        *self.dispatch_task.lock().await = Some(task);

        *self.state.lock().await = WatcherState::Ready;
        Ok(())
    }

    /// Stop watching. Cancels pending debounce timers and drops undelivered
    /// events.
    #[tracing::instrument(skip(self))]
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        if *state == WatcherState::Stopped {
            return;
        }
        *state = WatcherState::Stopping;
        drop(state);

        if let Some(debouncer) = self.debouncer.lock().await.take() {
            drop(debouncer);
        }
        if let Some(task) = self.dispatch_task.lock().await.take() {
            task.abort();
        }

        *self.state.lock().await = WatcherState::Stopped;
    }

    /// Manually inject a change event, tagged `agent-report`. The conflict
    /// detector uses this tag to skip re-handling of its own writes.
    pub fn report_change(&self, change_type: ChangeKind, absolute_path: PathBuf, size: Option<u64>) {
        if self.is_ignored(&absolute_path) {
            return;
        }
        let relative = absolute_path.strip_prefix(&self.root).unwrap_or(&absolute_path);
        let event = FileChangeEvent {
            change_type,
            path: NormalizedPath::new(relative),
            absolute_path,
            timestamp: now_ms(),
            size,
            detected_by: DetectedBy::AgentReport,
        };
        Self::dispatch(&self.handlers, &event);
    }
}

fn classify(kind: &notify::EventKind) -> Option<ChangeKind> {
    use notify::EventKind;
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Add),
        EventKind::Modify(notify::event::ModifyKind::Name(_)) => Some(ChangeKind::Rename),
        EventKind::Modify(_) => Some(ChangeKind::Change),
        EventKind::Remove(_) => Some(ChangeKind::Unlink),
        _ => None,
    }
}

/// Default ignore glob list: VCS internals, dependency directories, build
/// outputs, editor swap files, OS metadata.
#[must_use]
pub fn default_ignore_globs() -> Vec<String> {
    crate::config::WatcherConfig::default().ignore
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn starts_stopped() {
        let watcher = FsWatcher::new(PathBuf::from("/tmp"), &[], 150).unwrap();
        assert_eq!(watcher.state().await, WatcherState::Stopped);
    }

    #[test]
    fn rejects_invalid_glob() {
        let err = FsWatcher::new(PathBuf::from("/tmp"), &["[".to_owned()], 150);
        assert!(err.is_err());
    }

    #[test]
    fn report_change_invokes_subscribed_handlers() {
        let watcher = FsWatcher::new(PathBuf::from("/tmp"), &[], 150).unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        watcher.subscribe(move |_event| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        watcher.report_change(ChangeKind::Change, PathBuf::from("/tmp/a.txt"), Some(10));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn report_change_skips_ignored_paths() {
        let watcher = FsWatcher::new(PathBuf::from("/tmp"), &["**/*.swp".to_owned()], 150).unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        watcher.subscribe(move |_event| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        watcher.report_change(ChangeKind::Change, PathBuf::from("/tmp/a.txt.swp"), None);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let watcher = FsWatcher::new(PathBuf::from("/tmp"), &[], 150).unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        let id = watcher.subscribe(move |_event| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        watcher.unsubscribe(id);
        watcher.report_change(ChangeKind::Add, PathBuf::from("/tmp/a.txt"), None);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn faulty_handler_does_not_block_others() {
        let watcher = FsWatcher::new(PathBuf::from("/tmp"), &[], 150).unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        watcher.subscribe(|_event| panic!("boom"));
        let count_clone = Arc::clone(&count);
        watcher.subscribe(move |_event| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        watcher.report_change(ChangeKind::Add, PathBuf::from("/tmp/a.txt"), None);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
