//! Usage query backed by the in-flight operations recorded in cluster state.

use crate::repositories::{
    domain::{ClusterState, RepositoryName},
    ports::RepositoryUsage,
};

/// Reports a repository as in use while any snapshot, restore or snapshot
/// deletion recorded in cluster state targets it.
#[derive(Debug, Clone, Copy, Default)]
pub struct InFlightOperationsUsage;

impl RepositoryUsage for InFlightOperationsUsage {
    fn is_repository_referenced(&self, state: &ClusterState, name: &RepositoryName) -> bool {
        state
            .operations()
            .iter()
            .any(|operation| operation.repository() == name)
    }
}
