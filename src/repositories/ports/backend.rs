//! Backend capability contract implemented by each pluggable storage type.

use crate::repositories::domain::{
    DiscoveryNode, RepositoryDescriptor, RepositoryDomainError, VerificationToken,
};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Result type for backend operations.
pub type RepositoryBackendResult<T> = Result<T, RepositoryBackendError>;

/// Live, stateful runtime object bound to one descriptor.
///
/// Instances are never reconfigured in place; a changed descriptor always
/// closes the old instance and constructs a new one.
#[async_trait]
pub trait Repository: Send + Sync + fmt::Debug {
    /// Returns the descriptor this instance was built from.
    fn metadata(&self) -> &RepositoryDescriptor;

    /// Acquires backend resources. Must succeed before the instance is
    /// published.
    async fn start(&self) -> RepositoryBackendResult<()>;

    /// Releases backend resources.
    async fn close(&self) -> RepositoryBackendResult<()>;

    /// Prepares a verification round and returns its token.
    ///
    /// `None` means the backend declines verification, for example because it
    /// is read-only.
    async fn start_verification(&self) -> RepositoryBackendResult<Option<VerificationToken>>;

    /// Releases state created by [`Repository::start_verification`].
    async fn end_verification(&self, token: &VerificationToken) -> RepositoryBackendResult<()>;

    /// Exercises the backend from `node` for the round identified by `token`.
    async fn verify(
        &self,
        token: &VerificationToken,
        node: &DiscoveryNode,
    ) -> RepositoryBackendResult<()>;
}

/// Errors returned by backend implementations.
#[derive(Debug, Clone, Error)]
pub enum RepositoryBackendError {
    /// The backend settings are unusable.
    #[error(transparent)]
    InvalidSettings(#[from] RepositoryDomainError),

    /// The backing store cannot be reached.
    #[error("repository backend unavailable: {0}")]
    Unavailable(String),

    /// A verification canary could not be written or read back.
    #[error("repository verification failed: {0}")]
    VerificationFailed(String),

    /// The instance was already closed.
    #[error("repository is closed")]
    Closed,

    /// I/O failure against the backing store.
    #[error("repository I/O error: {0}")]
    Io(Arc<std::io::Error>),

    /// Generic runtime failure.
    #[error("repository runtime error: {0}")]
    Runtime(Arc<dyn std::error::Error + Send + Sync>),
}

impl RepositoryBackendError {
    /// Wraps a runtime error from a backend.
    pub fn runtime(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Runtime(Arc::new(err))
    }
}

impl From<std::io::Error> for RepositoryBackendError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}
