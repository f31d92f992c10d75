//! Service-level error taxonomy for registry operations.

use super::InvalidRegistryConfig;
use crate::repositories::{
    domain::{
        NodeId, RepositoryDomainError, RepositoryName, RepositoryType, VerificationFailure,
    },
    ports::{MetadataStoreError, RepositoryBackendError},
};
use thiserror::Error;

/// Errors surfaced by registry services.
#[derive(Debug, Error)]
pub enum RepositoryServiceError {
    /// Domain validation failed.
    #[error(transparent)]
    Domain(#[from] RepositoryDomainError),

    /// The registry configuration is unusable.
    #[error(transparent)]
    Config(#[from] InvalidRegistryConfig),

    /// No factory is registered for the descriptor's type.
    #[error("[{name}] repository type [{repository_type}] does not exist")]
    RepositoryTypeNotFound {
        /// Repository name.
        name: RepositoryName,
        /// Unknown backend type.
        repository_type: RepositoryType,
    },

    /// The backend failed to build or start an instance.
    #[error("[{name}] failed to create repository: {source}")]
    RepositoryConstructionFailed {
        /// Repository name.
        name: RepositoryName,
        /// Underlying backend cause.
        #[source]
        source: RepositoryBackendError,
    },

    /// An in-flight operation references the repository.
    #[error("[{0}] trying to modify or unregister repository that is currently used")]
    RepositoryInUse(RepositoryName),

    /// No repository matches the requested name or pattern.
    #[error("[{0}] missing")]
    RepositoryNotFound(String),

    /// One or more nodes failed verification.
    #[error("{0}")]
    VerificationAggregateFailure(VerificationFailure),

    /// The member holds no repositories, so it cannot run a verification round.
    #[error("[{0}] does not host repositories and cannot verify them")]
    VerificationUnavailable(NodeId),

    /// Probes succeeded but releasing verification state failed.
    #[error("[{name}] failed to finish repository verification: {source}")]
    VerificationCleanupFailure {
        /// Repository name.
        name: RepositoryName,
        /// Underlying backend cause.
        #[source]
        source: RepositoryBackendError,
    },

    /// The replicated metadata store failed.
    #[error(transparent)]
    MetadataStore(#[from] MetadataStoreError),

    /// A background task panicked or was aborted.
    #[error("background task failed: {0}")]
    Task(String),
}

impl RepositoryServiceError {
    /// Builds a not-found error for a concrete repository name.
    #[must_use]
    pub fn not_found(name: &RepositoryName) -> Self {
        Self::RepositoryNotFound(name.as_str().to_owned())
    }
}

/// Result type for registry service operations.
pub type RepositoryServiceResult<T> = Result<T, RepositoryServiceError>;
