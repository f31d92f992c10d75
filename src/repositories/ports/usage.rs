//! Port answering whether a repository is pinned by an in-flight operation.

use crate::repositories::domain::{ClusterState, RepositoryName};

/// Query consulted before a repository is modified or removed.
///
/// Evaluated against the same state the metadata mutation is computed from.
pub trait RepositoryUsage: Send + Sync {
    /// Returns `true` when `name` is referenced by a running snapshot,
    /// restore or deletion.
    fn is_repository_referenced(&self, state: &ClusterState, name: &RepositoryName) -> bool;
}
