//! Port carrying verification probes to cluster members.

use super::RepositoryBackendError;
use crate::repositories::domain::{DiscoveryNode, RepositoryName, VerificationToken};
use async_trait::async_trait;
use thiserror::Error;

/// Probe sent to every node during verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyNodeRequest {
    repository: RepositoryName,
    token: VerificationToken,
}

impl VerifyNodeRequest {
    /// Creates a probe request.
    #[must_use]
    pub const fn new(repository: RepositoryName, token: VerificationToken) -> Self {
        Self { repository, token }
    }

    /// Returns the repository to verify.
    #[must_use]
    pub const fn repository(&self) -> &RepositoryName {
        &self.repository
    }

    /// Returns the session token.
    #[must_use]
    pub const fn token(&self) -> &VerificationToken {
        &self.token
    }
}

/// Failure of a single probe.
#[derive(Debug, Clone, Error)]
pub enum ProbeError {
    /// The node holds no live instance of the repository.
    #[error("repository [{0}] is missing on this node")]
    RepositoryMissing(RepositoryName),

    /// The node's backend failed the probe.
    #[error(transparent)]
    Backend(#[from] RepositoryBackendError),

    /// The node could not be reached.
    #[error("node is not connected")]
    Disconnected,

    /// Network-level failure.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Delivers verification probes to nodes.
#[async_trait]
pub trait VerificationTransport: Send + Sync {
    /// Sends `request` to `node` and waits for its answer.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError`] when the node fails the probe or cannot be
    /// reached.
    async fn send(&self, node: &DiscoveryNode, request: VerifyNodeRequest)
    -> Result<(), ProbeError>;
}
