//! Content fingerprinting.
//!
//! A [`Fingerprint`] is a 16-hex-character prefix of the SHA-256 digest of a
//! file's bytes. It is a compact, collision-resistant identity for one
//! content snapshot — two snapshots with equal fingerprints are treated as
//! identical content.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Length in hex characters of a [`Fingerprint`].
pub const FINGERPRINT_LEN: usize = 16;

/// A validated 16-character lowercase hex content fingerprint.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Hash raw bytes into a fingerprint.
    #[must_use]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let digest = hasher.finalize();
        let hex = format!("{digest:x}");
        Self(hex[..FINGERPRINT_LEN].to_owned())
    }

    /// Hash UTF-8 text into a fingerprint (hashes the underlying bytes).
    #[must_use]
    pub fn of_text(text: &str) -> Self {
        Self::of_bytes(text.as_bytes())
    }

    /// Return the hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(s: &str) -> Result<(), FingerprintError> {
        if s.len() != FINGERPRINT_LEN {
            return Err(FingerprintError {
                value: s.to_owned(),
                reason: format!("expected {FINGERPRINT_LEN} hex characters, got {}", s.len()),
            });
        }
        if !s.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()) {
            return Err(FingerprintError {
                value: s.to_owned(),
                reason: "must contain only lowercase hex characters (0-9, a-f)".to_owned(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = FingerprintError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::validate(&s)?;
        Ok(Self(s))
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self {
        fp.0
    }
}

/// Error constructing a [`Fingerprint`] from an externally supplied string
/// (e.g. deserialization). Never produced by [`Fingerprint::of_bytes`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FingerprintError {
    /// The invalid value.
    pub value: String,
    /// Human-readable explanation.
    pub reason: String,
}

impl fmt::Display for FingerprintError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid fingerprint {:?}: {}", self.value, self.reason)
    }
}

impl std::error::Error for FingerprintError {}

/// Compute a [`Fingerprint`] for the given content (stable, see
/// `computeHash` in spec).
#[must_use]
pub fn fingerprint(bytes: &[u8]) -> Fingerprint {
    Fingerprint::of_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotent_for_equal_bytes() {
        assert_eq!(fingerprint(b"hello"), fingerprint(b"hello"));
    }

    #[test]
    fn differs_for_different_content() {
        assert_ne!(fingerprint(b"hello"), fingerprint(b"world"));
    }

    #[test]
    fn text_and_bytes_agree() {
        assert_eq!(Fingerprint::of_text("hello"), Fingerprint::of_bytes(b"hello"));
    }

    #[test]
    fn has_expected_length() {
        assert_eq!(fingerprint(b"anything").as_str().len(), FINGERPRINT_LEN);
    }

    #[test]
    fn round_trips_through_string() {
        let fp = fingerprint(b"round trip");
        let s: String = fp.clone().into();
        let back = Fingerprint::try_from(s).unwrap();
        assert_eq!(fp, back);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(Fingerprint::try_from("abc".to_owned()).is_err());
    }

    #[test]
    fn rejects_uppercase() {
        assert!(Fingerprint::try_from("ABCDEF0123456789".to_owned()).is_err());
    }
}
