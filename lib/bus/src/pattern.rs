//! Wildcard matching on dotted event types.
//!
//! A pattern is a dotted sequence of segments where `*` matches exactly
//! one segment; the lone pattern `*` matches any event type.

use crate::error::PatternError;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Wildcard,
}

/// A parsed subscription pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypePattern {
    segments: Vec<Segment>,
}

impl TypePattern {
    /// Returns true if the pattern matches the given dotted event type.
    #[must_use]
    pub fn matches(&self, event_type: &str) -> bool {
        // A lone `*` matches everything, regardless of segment count.
        if self.segments == [Segment::Wildcard] {
            return true;
        }
        let parts: Vec<&str> = event_type.split('.').collect();
        if parts.len() != self.segments.len() {
            return false;
        }
        self.segments
            .iter()
            .zip(parts)
            .all(|(segment, part)| match segment {
                Segment::Wildcard => true,
                Segment::Literal(literal) => literal == part,
            })
    }
}

impl FromStr for TypePattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(PatternError {
                reason: "pattern must not be empty".to_string(),
            });
        }
        let mut segments = Vec::new();
        for part in s.split('.') {
            if part.is_empty() {
                return Err(PatternError {
                    reason: format!("empty segment in {s:?}"),
                });
            }
            segments.push(if part == "*" {
                Segment::Wildcard
            } else {
                Segment::Literal(part.to_string())
            });
        }
        Ok(Self { segments })
    }
}

impl fmt::Display for TypePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for segment in &self.segments {
            if !first {
                write!(f, ".")?;
            }
            first = false;
            match segment {
                Segment::Wildcard => write!(f, "*")?,
                Segment::Literal(literal) => write!(f, "{literal}")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(s: &str) -> TypePattern {
        s.parse().expect("valid pattern")
    }

    #[test]
    fn literal_match() {
        assert!(pattern("issues.opened").matches("issues.opened"));
        assert!(!pattern("issues.opened").matches("issues.closed"));
    }

    #[test]
    fn wildcard_matches_one_segment() {
        assert!(pattern("issues.*").matches("issues.opened"));
        assert!(pattern("issues.*").matches("issues.closed"));
        assert!(!pattern("issues.*").matches("issues"));
        assert!(!pattern("issues.*").matches("issues.comment.created"));
    }

    #[test]
    fn lone_wildcard_matches_everything() {
        assert!(pattern("*").matches("anything"));
        assert!(pattern("*").matches("a.b.c"));
    }

    #[test]
    fn wildcard_in_middle() {
        assert!(pattern("security.*.detected").matches("security.secret.detected"));
        assert!(!pattern("security.*.detected").matches("security.secret.resolved"));
    }

    #[test]
    fn invalid_patterns_rejected() {
        assert!("".parse::<TypePattern>().is_err());
        assert!("a..b".parse::<TypePattern>().is_err());
        assert!(".a".parse::<TypePattern>().is_err());
    }
}
