//! Route matching logic.
//!
//! # Responsibilities
//! - Match a request path exactly (`/presentation`)
//! - Match a request path by prefix via a single trailing wildcard (`/app*`)
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - Only a trailing `*` is accepted; anything else is rejected at build time
//! - No regex to guarantee O(n) matching

use std::fmt;

/// Trait for matching request paths against a condition.
pub trait Matcher: Send + Sync + fmt::Debug {
    /// Returns true if the path matches this condition.
    fn matches(&self, path: &str) -> bool;
}

/// Error returned for a malformed pattern.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("pattern `{0}` must start with '/'")]
    MissingLeadingSlash(String),
    #[error("pattern `{0}` may only use '*' as its final character")]
    MisplacedWildcard(String),
}

/// A compiled path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathPattern {
    /// Matches one path exactly.
    Exact(String),
    /// Matches every path starting with the prefix (pattern written `prefix*`).
    Prefix(String),
}

impl PathPattern {
    /// Parse `"/app"` or `"/app*"`.
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        if !pattern.starts_with('/') {
            return Err(PatternError::MissingLeadingSlash(pattern.to_string()));
        }

        match pattern.find('*') {
            None => Ok(PathPattern::Exact(pattern.to_string())),
            Some(idx) if idx == pattern.len() - 1 => {
                Ok(PathPattern::Prefix(pattern[..idx].to_string()))
            }
            Some(_) => Err(PatternError::MisplacedWildcard(pattern.to_string())),
        }
    }
}

impl Matcher for PathPattern {
    fn matches(&self, path: &str) -> bool {
        match self {
            PathPattern::Exact(expected) => path == expected,
            PathPattern::Prefix(prefix) => path.starts_with(prefix.as_str()),
        }
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathPattern::Exact(path) => f.write_str(path),
            PathPattern::Prefix(prefix) => write!(f, "{}*", prefix),
        }
    }
}
