//! coordfs — a multi-session file coordination engine.
//!
//! Tracks reads and writes to a shared workspace across concurrent
//! sessions, detects binary content, three-way merges conflicting text
//! changes, watches the filesystem for external edits, and mediates it all
//! through a single conflict detector per workspace root.
//!
//! - [`binary`] — pure content classification (C1).
//! - [`tracker`] — per-file version/session bookkeeping (C2).
//! - [`merge`] — three-way textual merge (C3).
//! - [`watcher`] — recursive filesystem watching with debounce (C4).
//! - [`detector`] — the orchestrator tying the above together (C5).

pub mod binary;
pub mod config;
pub mod detector;
pub mod error;
pub mod events;
pub mod fs_trait;
pub mod hash;
pub mod merge;
pub mod path;
pub mod session;
pub mod telemetry;
pub mod tracker;
pub mod watcher;

pub use binary::{is_binary, BinaryDetection, Confidence};
pub use config::EngineConfig;
pub use detector::{Conflict, ConflictDetector, ConflictKind, ReadResult, Resolution, ResolveOutcome, WriteOutcome};
pub use error::CoordError;
pub use events::{ChangeType, EventBus, FileEvent};
pub use fs_trait::{FileStat, Filesystem, MemFilesystem, TokioFilesystem};
pub use hash::{fingerprint, Fingerprint};
pub use merge::{apply_patch, generate_diff, merge as merge_texts, MergeResult};
pub use path::NormalizedPath;
pub use session::{InstanceId, SessionId};
pub use tracker::{FileChangeTracker, FileVersion, TrackedFile};
pub use watcher::{ChangeKind, DetectedBy, FileChangeEvent, FsWatcher};
