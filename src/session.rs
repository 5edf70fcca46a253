//! Session and instance identifiers.
//!
//! Unlike [`crate::hash::Fingerprint`] or the teacher's `WorkspaceId`, these
//! are caller-assigned identifiers with no repo-internal format — any
//! non-empty string an embedding application uses to name a logical actor.
//! The one reserved value is `"external"`, attributed to watcher-observed
//! writes (see [`SessionId::external`]).

use std::fmt;

use serde::{Deserialize, Serialize};

/// The sentinel session id reserved for watcher-attributed writes.
pub const EXTERNAL_SESSION: &str = "external";

/// A logical actor that reads and writes files (typically one agent
/// interaction).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Create a new caller-assigned session id.
    ///
    /// # Errors
    /// Returns an error if `s` is empty or equal to the reserved
    /// `"external"` sentinel.
    pub fn new(s: impl Into<String>) -> Result<Self, SessionIdError> {
        let s = s.into();
        Self::validate(&s)?;
        Ok(Self(s))
    }

    /// The reserved sentinel session used to attribute watcher-observed
    /// writes. Not constructible via [`SessionId::new`].
    #[must_use]
    pub fn external() -> Self {
        Self(EXTERNAL_SESSION.to_owned())
    }

    /// `true` if this is the `"external"` sentinel.
    #[must_use]
    pub fn is_external(&self) -> bool {
        self.0 == EXTERNAL_SESSION
    }

    /// Return the session id as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(s: &str) -> Result<(), SessionIdError> {
        if s.is_empty() {
            return Err(SessionIdError {
                value: s.to_owned(),
                reason: "session id must not be empty".to_owned(),
            });
        }
        if s == EXTERNAL_SESSION {
            return Err(SessionIdError {
                value: s.to_owned(),
                reason: "\"external\" is reserved; use SessionId::external()".to_owned(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SessionId {
    type Error = SessionIdError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::validate(&s)?;
        Ok(Self(s))
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

/// Error constructing a [`SessionId`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionIdError {
    /// The invalid value.
    pub value: String,
    /// Human-readable explanation.
    pub reason: String,
}

impl fmt::Display for SessionIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid session id {:?}: {}", self.value, self.reason)
    }
}

impl std::error::Error for SessionIdError {}

/// A sub-identifier used for bookkeeping and event attribution, scoping one
/// run/instance of a session (e.g. a process restart under the same
/// session id).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId(String);

impl InstanceId {
    /// Create a new instance id. Any non-empty string is accepted.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// The instance id attached to tracker writes made during conflict
    /// resolution.
    #[must_use]
    pub fn resolution() -> Self {
        Self("resolution".to_owned())
    }

    /// Return the instance id as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstanceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for InstanceId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty() {
        assert!(SessionId::new("").is_err());
    }

    #[test]
    fn rejects_external_sentinel() {
        let err = SessionId::new("external").unwrap_err();
        assert!(err.reason.contains("reserved"));
    }

    #[test]
    fn external_constructs_the_sentinel() {
        assert!(SessionId::external().is_external());
    }

    #[test]
    fn ordinary_id_is_not_external() {
        let s = SessionId::new("agent-1").unwrap();
        assert!(!s.is_external());
    }

    #[test]
    fn instance_id_round_trips() {
        let i = InstanceId::new("run-7");
        assert_eq!(i.as_str(), "run-7");
    }
}
