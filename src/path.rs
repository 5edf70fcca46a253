//! Path normalization for use as a stable map key.
//!
//! Absolute paths are normalized by collapsing `.`/`..` components,
//! translating separators to `/`, and lowercasing. Path equality in the
//! tracker is by this normalized form; the original absolute form is kept
//! alongside for disk I/O.
//!
//! Lowercasing is a deliberate choice for case-insensitive filesystems and
//! cross-platform consistency. On case-sensitive systems this loses fidelity
//! for paths that differ only by case.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A normalized path, usable as a stable `HashMap` key across sessions.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NormalizedPath(String);

impl NormalizedPath {
    /// Normalize an absolute path: collapse `.`/`..`, use `/` separators,
    /// lowercase.
    #[must_use]
    pub fn new(path: &Path) -> Self {
        let mut parts: Vec<String> = Vec::new();
        for component in path.components() {
            match component {
                Component::Normal(part) => {
                    parts.push(part.to_string_lossy().to_lowercase());
                }
                Component::ParentDir => {
                    parts.pop();
                }
                Component::CurDir => {}
                Component::RootDir => {
                    parts.clear();
                    parts.push(String::new());
                }
                Component::Prefix(prefix) => {
                    parts.clear();
                    parts.push(prefix.as_os_str().to_string_lossy().to_lowercase());
                }
            }
        }
        Self(parts.join("/"))
    }

    /// Return the normalized string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert back to a `PathBuf` (lossy — the normalized form has
    /// discarded original casing and separators).
    #[must_use]
    pub fn to_path_buf(&self) -> PathBuf {
        PathBuf::from(&self.0)
    }
}

impl fmt::Display for NormalizedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&Path> for NormalizedPath {
    fn from(path: &Path) -> Self {
        Self::new(path)
    }
}

impl From<PathBuf> for NormalizedPath {
    fn from(path: PathBuf) -> Self {
        Self::new(&path)
    }
}
