//! Glob-style repository name patterns used by unregister requests.

use super::{RepositoryDomainError, RepositoryName};
use globset::{Glob, GlobMatcher};
use std::fmt;

/// The wildcard that matches every repository name.
pub const MATCH_ALL_PATTERN: &str = "*";

/// Compiled glob over repository names, for example `logs-*`.
#[derive(Debug, Clone)]
pub struct NamePattern {
    raw: String,
    // `None` for the match-all wildcard.
    matcher: Option<GlobMatcher>,
}

impl NamePattern {
    /// Compiles a name pattern.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryDomainError::InvalidNamePattern`] when the pattern
    /// is blank or not a valid glob.
    pub fn new(pattern: impl Into<String>) -> Result<Self, RepositoryDomainError> {
        let raw = pattern.into().trim().to_owned();
        if raw.is_empty() {
            return Err(RepositoryDomainError::InvalidNamePattern {
                pattern: raw,
                reason: "pattern must not be empty".to_owned(),
            });
        }

        if raw == MATCH_ALL_PATTERN {
            return Ok(Self::match_all());
        }

        let matcher = Glob::new(&raw)
            .map_err(|err| RepositoryDomainError::InvalidNamePattern {
                pattern: raw.clone(),
                reason: err.kind().to_string(),
            })?
            .compile_matcher();
        Ok(Self {
            raw,
            matcher: Some(matcher),
        })
    }

    /// Creates the pattern that matches every name.
    #[must_use]
    pub fn match_all() -> Self {
        Self {
            raw: MATCH_ALL_PATTERN.to_owned(),
            matcher: None,
        }
    }

    /// Returns `true` when `name` matches the pattern.
    #[must_use]
    pub fn matches(&self, name: &RepositoryName) -> bool {
        self.matcher
            .as_ref()
            .is_none_or(|matcher| matcher.is_match(name.as_str()))
    }

    /// Returns `true` for the bare match-all wildcard.
    #[must_use]
    pub const fn is_match_all(&self) -> bool {
        self.matcher.is_none()
    }

    /// Returns the pattern as a repository name when it is a plain name
    /// rather than a wildcard.
    #[must_use]
    pub fn literal_name(&self) -> Option<RepositoryName> {
        RepositoryName::new(self.raw.as_str()).ok()
    }

    /// Returns the pattern text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl PartialEq for NamePattern {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for NamePattern {}

impl fmt::Display for NamePattern {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.raw)
    }
}
