//! Binary file detection (C1).
//!
//! A pure function, no state, no side effects: classify `(content, path?)`
//! as binary or text with a confidence level and reason. Grounded on the
//! null-byte-scan heuristic in `itsSauraj-kit-cat`'s `is_binary`
//! (first-8KiB null-byte scan) and extended with the path-extension and
//! magic-byte tables and non-printable-ratio scoring this engine's spec
//! calls for.

use std::path::Path;

/// How confident the classification is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Confidence {
    /// Matched a definitive signal (extension or magic bytes, or a null
    /// byte).
    High,
    /// Derived from the non-printable-byte ratio, in the ambiguous middle
    /// band.
    Medium,
    /// Weakly suggestive; callers may want a second opinion.
    Low,
}

/// Result of classifying one buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BinaryDetection {
    /// Whether the content is classified as binary.
    pub is_binary: bool,
    /// How confident the classification is.
    pub confidence: Confidence,
    /// Human-readable reason for the classification.
    pub reason: String,
    /// The detected file type, if a signature or extension matched.
    pub detected_type: Option<String>,
}

impl BinaryDetection {
    fn binary(confidence: Confidence, reason: impl Into<String>, detected_type: Option<&str>) -> Self {
        Self {
            is_binary: true,
            confidence,
            reason: reason.into(),
            detected_type: detected_type.map(str::to_owned),
        }
    }

    fn text(confidence: Confidence, reason: impl Into<String>) -> Self {
        Self {
            is_binary: false,
            confidence,
            reason: reason.into(),
            detected_type: None,
        }
    }
}

/// Extensions that are always treated as binary, high confidence.
const BINARY_EXTENSIONS: &[&str] = &[
    // images
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "tiff", "psd", "heic",
    // archives
    "zip", "tar", "gz", "bz2", "xz", "7z", "rar", "zst",
    // executables / objects
    "exe", "dll", "so", "dylib", "bin", "o", "a", "wasm",
    // fonts
    "ttf", "otf", "woff", "woff2", "eot",
    // databases
    "db", "sqlite", "sqlite3", "mdb",
    // multimedia
    "mp3", "mp4", "mov", "avi", "mkv", "flac", "wav", "ogg", "webm",
    // misc binary formats
    "pdf", "class", "pyc", "jar",
];

/// Extensions that are always treated as text, high confidence.
const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "markdown", "rs", "py", "js", "ts", "jsx", "tsx", "go", "java", "c", "h", "cpp",
    "hpp", "cs", "rb", "php", "sh", "bash", "zsh", "json", "yaml", "yml", "toml", "xml", "html",
    "htm", "css", "scss", "sql", "csv", "tsv", "ini", "cfg", "conf", "gitignore", "env", "lock",
];

/// `(name, magic bytes, offset)`.
const MAGIC_BYTES: &[(&str, &[u8], usize)] = &[
    ("PNG", &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A], 0),
    ("PDF", b"%PDF-", 0),
    ("ZIP", &[0x50, 0x4B, 0x03, 0x04], 0),
    ("ZIP (empty)", &[0x50, 0x4B, 0x05, 0x06], 0),
    ("OLE (doc/xls/ppt)", &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1], 0),
    ("ELF", &[0x7F, 0x45, 0x4C, 0x46], 0),
    ("Mach-O (32-bit)", &[0xFE, 0xED, 0xFA, 0xCE], 0),
    ("Mach-O (64-bit)", &[0xFE, 0xED, 0xFA, 0xCF], 0),
    ("PE (exe/dll)", &[0x4D, 0x5A], 0),
    ("GIF87a", b"GIF87a", 0),
    ("GIF89a", b"GIF89a", 0),
    ("JPEG", &[0xFF, 0xD8, 0xFF], 0),
    ("WebM/MKV", &[0x1A, 0x45, 0xDF, 0xA3], 0),
    ("FLAC", b"fLaC", 0),
    ("SQLite", b"SQLite format 3\0", 0),
    ("WOFF", b"wOFF", 0),
    ("WOFF2", b"wOF2", 0),
    ("GZIP", &[0x1F, 0x8B], 0),
];

const SCAN_WINDOW: usize = 8192;

/// Classify `content` (optionally aided by `path`'s extension) as binary or
/// text.
///
/// Never fails: an empty buffer with no path is classified as text/high.
#[must_use]
pub fn is_binary(content: &[u8], path: Option<&Path>) -> BinaryDetection {
    if let Some(path) = path
        && let Some(ext) = path.extension().and_then(|e| e.to_str())
    {
        let ext_lower = ext.to_lowercase();
        if BINARY_EXTENSIONS.contains(&ext_lower.as_str()) {
            return BinaryDetection::binary(
                Confidence::High,
                format!("extension '.{ext_lower}' is a known binary format"),
                Some(&ext_lower),
            );
        }
        if TEXT_EXTENSIONS.contains(&ext_lower.as_str()) {
            return BinaryDetection::text(
                Confidence::High,
                format!("extension '.{ext_lower}' is a known text format"),
            );
        }
    }

    for (name, magic, offset) in MAGIC_BYTES {
        if content.len() >= offset + magic.len() && &content[*offset..offset + magic.len()] == *magic {
            return BinaryDetection::binary(
                Confidence::High,
                format!("magic bytes match {name}"),
                Some(name),
            );
        }
    }

    if content.is_empty() {
        return BinaryDetection::text(Confidence::High, "empty buffer");
    }

    let window = &content[..content.len().min(SCAN_WINDOW)];

    if window.contains(&0x00) {
        return BinaryDetection::binary(Confidence::High, "contains a null byte", None);
    }

    let non_printable = window
        .iter()
        .filter(|&&b| !is_plausibly_textual(b))
        .count();
    let ratio = non_printable as f64 / window.len() as f64;

    if ratio > 0.3 {
        BinaryDetection::binary(
            Confidence::Medium,
            format!("{:.1}% non-printable bytes", ratio * 100.0),
            None,
        )
    } else if ratio > 0.1 {
        BinaryDetection::binary(
            Confidence::Low,
            format!("{:.1}% non-printable bytes", ratio * 100.0),
            None,
        )
    } else if ratio <= 0.01 {
        BinaryDetection::text(Confidence::High, "negligible non-printable bytes")
    } else {
        BinaryDetection::text(Confidence::Medium, "low non-printable byte ratio")
    }
}

/// `true` for whitespace control characters, printable ASCII, and the
/// UTF-8 continuation/leader byte band — all treated as plausibly textual.
const fn is_plausibly_textual(b: u8) -> bool {
    matches!(b, 0x09 | 0x0A | 0x0D) || matches!(b, 0x20..=0x7E) || matches!(b, 0x80..=0xF7)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_buffer_no_path_is_text_high() {
        let d = is_binary(&[], None);
        assert!(!d.is_binary);
        assert_eq!(d.confidence, Confidence::High);
    }

    #[test]
    fn png_extension_is_binary() {
        let d = is_binary(b"whatever", Some(Path::new("photo.PNG")));
        assert!(d.is_binary);
        assert_eq!(d.confidence, Confidence::High);
    }

    #[test]
    fn rs_extension_is_text() {
        let d = is_binary(b"fn main() {}", Some(Path::new("main.rs")));
        assert!(!d.is_binary);
    }

    #[test]
    fn png_magic_bytes_detected_without_extension() {
        let png = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0];
        let d = is_binary(&png, None);
        assert!(d.is_binary);
        assert_eq!(d.detected_type.as_deref(), Some("PNG"));
    }

    #[test]
    fn short_buffer_does_not_match_longer_signature() {
        let short = [0x89, 0x50];
        let d = is_binary(&short, None);
        assert!(!d.is_binary || d.detected_type.as_deref() != Some("PNG"));
    }

    #[test]
    fn null_byte_is_binary_high() {
        let d = is_binary(b"hello\x00world", None);
        assert!(d.is_binary);
        assert_eq!(d.confidence, Confidence::High);
    }

    #[test]
    fn plain_text_is_text() {
        let d = is_binary(b"the quick brown fox jumps over the lazy dog\n", None);
        assert!(!d.is_binary);
    }

    #[test]
    fn utf8_continuation_bytes_not_penalized() {
        let text = "héllo wörld, ünïcödé everywhere à la mode".repeat(4);
        let d = is_binary(text.as_bytes(), None);
        assert!(!d.is_binary);
    }

    #[test]
    fn high_non_printable_ratio_is_binary_medium() {
        let noisy: Vec<u8> = (0..200).map(|i| if i % 2 == 0 { 0x01 } else { b'a' }).collect();
        let d = is_binary(&noisy, None);
        assert!(d.is_binary);
        assert_eq!(d.confidence, Confidence::Medium);
    }
}
