//! Validated repository name and backend type.

use super::RepositoryDomainError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length of a repository name in bytes.
const MAX_REPOSITORY_NAME_LENGTH: usize = 255;

/// Characters that collide with pattern syntax or path separators.
const RESERVED_NAME_CHARACTERS: [char; 6] = ['*', '?', ',', '/', '\\', '"'];

/// Validated repository name, the unique key of a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepositoryName(String);

impl RepositoryName {
    /// Creates a validated repository name.
    ///
    /// The input is trimmed. Names must not contain whitespace or any of
    /// `* ? , / \ "`, and must not start with `_` or `-`.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryDomainError`] when validation fails.
    pub fn new(value: impl Into<String>) -> Result<Self, RepositoryDomainError> {
        let normalized = value.into().trim().to_owned();

        if normalized.is_empty() {
            return Err(RepositoryDomainError::EmptyRepositoryName);
        }

        if normalized.len() > MAX_REPOSITORY_NAME_LENGTH {
            return Err(RepositoryDomainError::RepositoryNameTooLong(normalized));
        }

        if normalized.starts_with(['_', '-']) {
            return Err(RepositoryDomainError::InvalidRepositoryName {
                name: normalized,
                reason: "must not start with '_' or '-'",
            });
        }

        let has_reserved = normalized.chars().any(|character| {
            character.is_whitespace() || RESERVED_NAME_CHARACTERS.contains(&character)
        });
        if has_reserved {
            return Err(RepositoryDomainError::InvalidRepositoryName {
                name: normalized,
                reason: "must not contain whitespace or any of * ? , / \\ \"",
            });
        }

        Ok(Self(normalized))
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RepositoryName {
    type Error = RepositoryDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RepositoryName> for String {
    fn from(value: RepositoryName) -> Self {
        value.0
    }
}

impl AsRef<str> for RepositoryName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for RepositoryName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Backend type name used to resolve a factory, for example `fs`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepositoryType(String);

impl RepositoryType {
    /// Creates a validated backend type name.
    ///
    /// The input is trimmed and lowercased.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryDomainError::EmptyRepositoryType`] when the value
    /// is blank.
    pub fn new(value: impl Into<String>) -> Result<Self, RepositoryDomainError> {
        let normalized = value.into().trim().to_ascii_lowercase();
        if normalized.is_empty() {
            return Err(RepositoryDomainError::EmptyRepositoryType);
        }
        Ok(Self(normalized))
    }

    /// Returns the type name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RepositoryType {
    type Error = RepositoryDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RepositoryType> for String {
    fn from(value: RepositoryType) -> Self {
        value.0
    }
}

impl AsRef<str> for RepositoryType {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for RepositoryType {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}
