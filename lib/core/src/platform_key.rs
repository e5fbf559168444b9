//! Platform key addressing.
//!
//! Every credential, rate-limit bucket, and event is scoped to a platform,
//! optionally narrowed to a specific account on that platform. The textual
//! form is `platform` or `platform:account`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error returned when parsing a platform key from a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsePlatformKeyError {
    /// The reason for the parse failure.
    pub reason: String,
}

impl fmt::Display for ParsePlatformKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse platform key: {}", self.reason)
    }
}

impl std::error::Error for ParsePlatformKeyError {}

/// Identifies a platform, optionally scoped to one account.
///
/// Textual form: `platform` or `platform:account`. Segments are limited to
/// alphanumerics plus `_`, `-`, and `.` so keys map cleanly onto file names
/// and OS secret store entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PlatformKey {
    platform: String,
    account: Option<String>,
}

fn valid_segment(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

impl PlatformKey {
    /// Creates a key scoped to a platform's default account.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform name is empty or contains characters
    /// outside the allowed set.
    pub fn new(platform: impl Into<String>) -> Result<Self, ParsePlatformKeyError> {
        let platform = platform.into();
        if !valid_segment(&platform) {
            return Err(ParsePlatformKeyError {
                reason: format!("invalid platform segment: {platform:?}"),
            });
        }
        Ok(Self {
            platform,
            account: None,
        })
    }

    /// Creates a key scoped to a specific account on a platform.
    ///
    /// # Errors
    ///
    /// Returns an error if either segment is empty or contains characters
    /// outside the allowed set.
    pub fn with_account(
        platform: impl Into<String>,
        account: impl Into<String>,
    ) -> Result<Self, ParsePlatformKeyError> {
        let mut key = Self::new(platform)?;
        let account = account.into();
        if !valid_segment(&account) {
            return Err(ParsePlatformKeyError {
                reason: format!("invalid account segment: {account:?}"),
            });
        }
        key.account = Some(account);
        Ok(key)
    }

    /// Returns the platform name.
    #[must_use]
    pub fn platform(&self) -> &str {
        &self.platform
    }

    /// Returns the account name, if this key is account-scoped.
    #[must_use]
    pub fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }
}

impl fmt::Display for PlatformKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.account {
            Some(account) => write!(f, "{}:{}", self.platform, account),
            None => write!(f, "{}", self.platform),
        }
    }
}

impl FromStr for PlatformKey {
    type Err = ParsePlatformKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((platform, account)) => {
                if account.contains(':') {
                    return Err(ParsePlatformKeyError {
                        reason: format!("too many ':' separators in {s:?}"),
                    });
                }
                Self::with_account(platform, account)
            }
            None => Self::new(s),
        }
    }
}

impl TryFrom<String> for PlatformKey {
    type Error = ParsePlatformKeyError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<PlatformKey> for String {
    fn from(key: PlatformKey) -> Self {
        key.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_only_key() {
        let key = PlatformKey::new("github").expect("valid");
        assert_eq!(key.platform(), "github");
        assert_eq!(key.account(), None);
        assert_eq!(key.to_string(), "github");
    }

    #[test]
    fn account_scoped_key() {
        let key = PlatformKey::with_account("slack", "team-a").expect("valid");
        assert_eq!(key.platform(), "slack");
        assert_eq!(key.account(), Some("team-a"));
        assert_eq!(key.to_string(), "slack:team-a");
    }

    #[test]
    fn parse_roundtrip() {
        let key: PlatformKey = "gitlab:work".parse().expect("should parse");
        assert_eq!(key.platform(), "gitlab");
        assert_eq!(key.account(), Some("work"));

        let bare: PlatformKey = "gitlab".parse().expect("should parse");
        assert_eq!(bare.account(), None);
    }

    #[test]
    fn rejects_empty_platform() {
        assert!(PlatformKey::new("").is_err());
        assert!(":account".parse::<PlatformKey>().is_err());
    }

    #[test]
    fn rejects_extra_separators() {
        assert!("a:b:c".parse::<PlatformKey>().is_err());
    }

    #[test]
    fn rejects_invalid_characters() {
        assert!(PlatformKey::new("git hub").is_err());
        assert!(PlatformKey::with_account("github", "a/b").is_err());
    }

    #[test]
    fn serde_roundtrip() {
        let key = PlatformKey::with_account("github", "personal").expect("valid");
        let json = serde_json::to_string(&key).expect("serialize");
        assert_eq!(json, "\"github:personal\"");
        let parsed: PlatformKey = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(key, parsed);
    }
}
