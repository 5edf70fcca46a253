//! Diff/patch primitives backing the merge service.
//!
//! `similar` drives line-level diffing (used for the patch-path hunk count
//! and [`generate_diff`]'s unified-diff-like rendering); `diffy` drives
//! patch creation/application, used both internally (the "patch path" in
//! merge step 4) and exposed publicly as [`apply_patch`]. This pairing
//! mirrors `andyyu2004-bit`'s use of `diffy` for conflict-style merging
//! alongside `similar`'s broader presence across the corpus for line diffs.

use std::fmt;

use similar::{ChangeTag, TextDiff};

/// Attempt the "patch path": diff `base` → `ours`, then replay that patch
/// against `theirs`. Returns `Some(merged)` if every hunk applied cleanly,
/// `None` if any hunk's context no longer matches `theirs` (caller falls
/// back to a line-by-line merge).
pub(super) fn try_patch_path(base: &str, ours: &str, theirs: &str) -> Option<String> {
    let patch = diffy::create_patch(base, ours);
    diffy::apply(theirs, &patch).ok()
}

/// Rebase the changes between `original` and `patched` onto `target`.
///
/// # Errors
/// Returns [`ApplyPatchError`] if a hunk's expected context no longer
/// matches `target`.
pub fn apply_patch(original: &str, patched: &str, target: &str) -> Result<String, ApplyPatchError> {
    let patch = diffy::create_patch(original, patched);
    diffy::apply(target, &patch).map_err(|source| ApplyPatchError {
        detail: source.to_string(),
    })
}

/// A patch hunk could not be applied to the target text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApplyPatchError {
    /// Human-readable detail from the underlying patch library.
    detail: String,
}

impl fmt::Display for ApplyPatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "patch did not apply: {}", self.detail)
    }
}

impl std::error::Error for ApplyPatchError {}

/// Render a unified-diff-like view of the change from `old` to `new`:
/// ` `/`-`/`+`-prefixed lines, each annotated with its line number in the
/// side it came from.
#[must_use]
pub fn generate_diff(old: &str, new: &str) -> String {
    let diff = TextDiff::from_lines(old, new);
    let mut out = String::new();
    let mut old_line = 1usize;
    let mut new_line = 1usize;

    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Equal => {
                out.push_str(&format!("  {old_line:>4} {new_line:>4} {change}"));
                old_line += 1;
                new_line += 1;
            }
            ChangeTag::Delete => {
                out.push_str(&format!("- {old_line:>4}      {change}"));
                old_line += 1;
            }
            ChangeTag::Insert => {
                out.push_str(&format!("+      {new_line:>4} {change}"));
                new_line += 1;
            }
        }
        if !out.ends_with('\n') {
            out.push('\n');
        }
    }

    out
}
