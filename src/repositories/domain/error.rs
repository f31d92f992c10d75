//! Error types for repository domain validation and parsing.

use thiserror::Error;

/// Errors returned while constructing repository domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RepositoryDomainError {
    /// The repository name is empty after trimming.
    #[error("repository name must not be empty")]
    EmptyRepositoryName,

    /// The repository name contains a reserved character or prefix.
    #[error("repository name '{name}' is invalid: {reason}")]
    InvalidRepositoryName {
        /// Offending name.
        name: String,
        /// Why the name was rejected.
        reason: &'static str,
    },

    /// The repository name exceeds the 255-byte limit.
    #[error("repository name exceeds 255 bytes: {0}")]
    RepositoryNameTooLong(String),

    /// The repository type is empty after trimming.
    #[error("repository type must not be empty")]
    EmptyRepositoryType,

    /// The repository name pattern is empty or not a valid glob.
    #[error("invalid repository name pattern '{pattern}': {reason}")]
    InvalidNamePattern {
        /// Offending pattern.
        pattern: String,
        /// Parser diagnostic.
        reason: String,
    },

    /// A settings value could not be parsed as the requested type.
    #[error("setting '{key}' has invalid value '{value}', expected {expected}")]
    InvalidSetting {
        /// Settings key.
        key: String,
        /// Raw value.
        value: String,
        /// Expected value kind.
        expected: &'static str,
    },

    /// A node identifier is empty after trimming.
    #[error("node identifier must not be empty")]
    EmptyNodeId,
}

/// Error returned while parsing a node role.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown node role: {0}")]
pub struct ParseNodeRoleError(pub String);
