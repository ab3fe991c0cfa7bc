use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which authority decides whether a transition is legal.
///
/// The mode is process-wide configuration, never per subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum AuthorityMode {
    /// Only the local rule table decides.
    #[default]
    Embedded,
    /// Local decides; the remote is consulted in shadow for drift telemetry.
    Hybrid,
    /// The remote decides and failures are fail-closed.
    Remote,
}

impl AuthorityMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthorityMode::Embedded => "embedded",
            AuthorityMode::Hybrid => "hybrid",
            AuthorityMode::Remote => "remote",
        }
    }

    /// Whether this mode calls the remote decision endpoint at all.
    pub fn consults_remote(&self) -> bool {
        !matches!(self, AuthorityMode::Embedded)
    }
}

impl fmt::Display for AuthorityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown mode string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown authority mode '{0}' (expected embedded, hybrid or remote)")]
pub struct ParseModeError(pub String);

impl FromStr for AuthorityMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "embedded" => Ok(AuthorityMode::Embedded),
            "hybrid" => Ok(AuthorityMode::Hybrid),
            "remote" => Ok(AuthorityMode::Remote),
            _ => Err(ParseModeError(s.to_string())),
        }
    }
}

impl TryFrom<String> for AuthorityMode {
    type Error = ParseModeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("HYBRID".parse::<AuthorityMode>(), Ok(AuthorityMode::Hybrid));
        assert_eq!(" remote ".parse::<AuthorityMode>(), Ok(AuthorityMode::Remote));
        assert!("shadow".parse::<AuthorityMode>().is_err());
    }

    #[test]
    fn embedded_is_default_and_never_consults_remote() {
        assert_eq!(AuthorityMode::default(), AuthorityMode::Embedded);
        assert!(!AuthorityMode::Embedded.consults_remote());
        assert!(AuthorityMode::Hybrid.consults_remote());
        assert!(AuthorityMode::Remote.consults_remote());
    }

    #[test]
    fn deserializes_any_case_and_serializes_lowercase() {
        let mode: AuthorityMode = serde_json::from_str("\"Hybrid\"").unwrap();
        assert_eq!(mode, AuthorityMode::Hybrid);
        assert!(serde_json::from_str::<AuthorityMode>("\"shadow\"").is_err());
        assert_eq!(
            serde_json::to_string(&AuthorityMode::Remote).unwrap(),
            "\"remote\""
        );
    }
}
