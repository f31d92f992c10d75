//! Constructor capability registered per backend type.

use super::{Repository, RepositoryBackendResult};
use crate::repositories::domain::RepositoryDescriptor;
use std::sync::Arc;

/// Builds unstarted [`Repository`] instances for one backend type.
///
/// Construction must not block; slow handshakes belong in
/// [`Repository::start`], which the registry bounds with a timeout.
pub trait RepositoryFactory: Send + Sync {
    /// Creates an instance for `descriptor`.
    ///
    /// # Errors
    ///
    /// Returns backend errors when the descriptor settings are unusable.
    fn create(
        &self,
        descriptor: &RepositoryDescriptor,
    ) -> RepositoryBackendResult<Arc<dyn Repository>>;
}
