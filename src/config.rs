//! Coordination engine configuration (`coordfs.toml`).
//!
//! Defines the typed configuration for the engine: cache and history sizing,
//! watcher debounce timing, ignore patterns, and merge tie-break hints.
//! Missing file → all defaults (no error).

use std::fmt;
use std::path::Path;

use serde::Deserialize;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level coordination engine configuration.
///
/// Parsed from `coordfs.toml`. Missing fields use sensible defaults.
#[derive(Clone, Debug, PartialEq, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Change tracker settings.
    #[serde(default)]
    pub tracker: TrackerConfig,

    /// Filesystem watcher settings.
    #[serde(default)]
    pub watcher: WatcherConfig,

    /// Merge behaviour settings.
    #[serde(default)]
    pub merge: MergeConfig,
}

// ---------------------------------------------------------------------------
// TrackerConfig
// ---------------------------------------------------------------------------

/// Change tracker settings.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrackerConfig {
    /// Maximum bytes a `FileVersion` will cache content for (default 100 KiB).
    #[serde(default = "default_max_cache_size")]
    pub max_cache_size: u64,

    /// Maximum number of versions kept per tracked file (default 10).
    #[serde(default = "default_max_versions_per_file")]
    pub max_versions_per_file: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_cache_size: default_max_cache_size(),
            max_versions_per_file: default_max_versions_per_file(),
        }
    }
}

const fn default_max_cache_size() -> u64 {
    100 * 1024
}

const fn default_max_versions_per_file() -> usize {
    10
}

// ---------------------------------------------------------------------------
// WatcherConfig
// ---------------------------------------------------------------------------

/// Filesystem watcher settings.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatcherConfig {
    /// Debounce window in milliseconds (default 150).
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Glob patterns excluded from watching.
    #[serde(default = "default_ignore")]
    pub ignore: Vec<String>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            ignore: default_ignore(),
        }
    }
}

const fn default_debounce_ms() -> u64 {
    150
}

fn default_ignore() -> Vec<String> {
    [
        ".git/**",
        ".jj/**",
        ".hg/**",
        "node_modules/**",
        "target/**",
        "dist/**",
        "build/**",
        "*.swp",
        "*.swo",
        "*~",
        ".DS_Store",
        "Thumbs.db",
    ]
    .into_iter()
    .map(str::to_owned)
    .collect()
}

// ---------------------------------------------------------------------------
// MergeConfig
// ---------------------------------------------------------------------------

/// Merge behaviour settings.
#[derive(Clone, Debug, PartialEq, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct MergeConfig {
    /// Tie-break hint for a future non-deterministic merge strategy. Unused
    /// by the current (deterministic) algorithm; present for forward
    /// compatibility, mirroring how the teacher's own merge config carries
    /// fields ahead of the behavior that consumes them.
    #[serde(default)]
    pub prefer: MergePreference,
}

/// A tie-break preference. Currently inert — the merge algorithm in §4.3 is
/// fully deterministic and never consults this field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergePreference {
    /// No preference (default).
    #[default]
    None,
    /// Prefer `ours` when a future strategy allows a tie-break.
    Ours,
    /// Prefer `theirs` when a future strategy allows a tie-break.
    Theirs,
}

impl fmt::Display for MergePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Ours => write!(f, "ours"),
            Self::Theirs => write!(f, "theirs"),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Error loading an engine configuration file.
#[derive(Debug)]
pub struct ConfigError {
    /// The path that was being loaded (if available).
    pub path: Option<std::path::PathBuf>,
    /// Human-readable message with line-level detail when possible.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(p) = &self.path {
            write!(f, "{}: {}", p.display(), self.message)
        } else {
            write!(f, "config error: {}", self.message)
        }
    }
}

impl std::error::Error for ConfigError {}

impl EngineConfig {
    /// Load configuration from a TOML file.
    ///
    /// If the file does not exist, returns all defaults (not an error).
    ///
    /// # Errors
    /// Returns `ConfigError` on I/O errors (other than not-found) or parse
    /// errors.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError {
                    path: Some(path.to_owned()),
                    message: format!("could not read file: {e}"),
                });
            }
        };
        Self::parse(&contents).map_err(|mut e| {
            e.path = Some(path.to_owned());
            e
        })
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `ConfigError` on invalid TOML or unknown fields.
    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| {
            let mut message = e.message().to_owned();
            if let Some(span) = e.span() {
                let line = toml_str[..span.start].chars().filter(|&c| c == '\n').count() + 1;
                message = format!("line {line}: {message}");
            }
            ConfigError { path: None, message }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.tracker.max_cache_size, 100 * 1024);
        assert_eq!(cfg.tracker.max_versions_per_file, 10);
        assert_eq!(cfg.watcher.debounce_ms, 150);
        assert!(cfg.watcher.ignore.contains(&".git/**".to_owned()));
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let cfg = EngineConfig::load(Path::new("/nonexistent/coordfs.toml")).unwrap();
        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn parse_partial_overrides_fill_defaults() {
        let cfg = EngineConfig::parse("[tracker]\nmax_cache_size = 2048\n").unwrap();
        assert_eq!(cfg.tracker.max_cache_size, 2048);
        assert_eq!(cfg.tracker.max_versions_per_file, 10);
        assert_eq!(cfg.watcher.debounce_ms, 150);
    }

    #[test]
    fn parse_invalid_toml_reports_line() {
        let err = EngineConfig::parse("not valid toml {{{").unwrap_err();
        assert!(err.message.contains("line"));
    }

    #[test]
    fn parse_unknown_field_rejected() {
        assert!(EngineConfig::parse("bogus = true\n").is_err());
    }

    #[test]
    fn merge_preference_display() {
        assert_eq!(MergePreference::Ours.to_string(), "ours");
    }
}
