//! Unit tests for repository registry services.


use crate::repositories::{
    adapters::memory::{InMemoryBlobStore, InMemoryRepositoryFactory},
    domain::{
        ClusterState, DiscoveryNode, NodeId, NodeRole, RepositoryDescriptor, RepositoryName,
        RepositorySettings, RepositoryType,
    },
    services::{InstanceFactory, LiveRepositories, RegistryConfig, RepositoryFactories},
};
use std::sync::Arc;

pub(super) fn name(value: &str) -> RepositoryName {
    RepositoryName::new(value).expect("valid repository name")
}

pub(super) fn repository_type(value: &str) -> RepositoryType {
    RepositoryType::new(value).expect("valid repository type")
}

pub(super) fn node(id: &str) -> DiscoveryNode {
    DiscoveryNode::new(
        NodeId::new(id).expect("valid node id"),
        [NodeRole::Master, NodeRole::Data].into_iter().collect(),
    )
}

pub(super) fn descriptor(
    repository: &str,
    backend: &str,
    settings: RepositorySettings,
) -> RepositoryDescriptor {
    RepositoryDescriptor::new(name(repository), repository_type(backend), settings)
}

pub(super) fn state_with(
    nodes: Vec<DiscoveryNode>,
    descriptors: &[RepositoryDescriptor],
) -> ClusterState {
    ClusterState::initial(nodes).with_repositories(descriptors.iter().cloned().collect())
}

/// Live maps whose user and internal namespaces both resolve `memory` and
/// `memtype` to in-memory backends over `blobs`.
pub(super) fn live_repositories(blobs: &InMemoryBlobStore) -> Arc<LiveRepositories> {
    let factory = Arc::new(InMemoryRepositoryFactory::new(blobs.clone()));
    let factories = RepositoryFactories::new()
        .with(repository_type("memory"), factory.clone())
        .with(repository_type("memtype"), factory);
    Arc::new(LiveRepositories::new(InstanceFactory::new(
        factories.clone(),
        factories,
        RegistryConfig::fast(),
    )))
}
