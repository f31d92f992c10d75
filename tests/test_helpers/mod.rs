//! Shared harness for simulated multi-node registry clusters.

use mockable::DefaultClock;
use palladio::repositories::{
    adapters::{
        FsRepositoryFactory, InFlightOperationsUsage,
        memory::{
            InMemoryBlobStore, InMemoryMetadataStore, InMemoryRepositoryFactory,
            InMemoryVerificationTransport,
        },
    },
    domain::{DiscoveryNode, NodeId, NodeRole, RepositoryName, RepositoryType},
    ports::MetadataStore,
    services::{NodeCollaborators, RegistryConfig, RepositoryFactories, RepositoryNode},
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Registry node type used by every cluster test.
pub type TestNode = RepositoryNode<
    InMemoryMetadataStore,
    InFlightOperationsUsage,
    InMemoryVerificationTransport,
    DefaultClock,
>;

/// A set of registry nodes sharing one metadata store, transport and blob
/// store.
pub struct TestCluster {
    /// Replicated metadata shared by every member.
    pub store: Arc<InMemoryMetadataStore>,
    /// Probe transport connecting every member.
    pub transport: Arc<InMemoryVerificationTransport>,
    /// Object store behind the `memory` and `memtype` backends.
    pub blobs: InMemoryBlobStore,
    /// Running members in declaration order.
    pub nodes: Vec<TestNode>,
}

impl TestCluster {
    /// Starts one registry node per member.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when a node cannot be started or connected.
    #[must_use]
    pub fn start(members: Vec<DiscoveryNode>) -> Self {
        init_tracing();
        let config = RegistryConfig::fast();
        let blobs = InMemoryBlobStore::new();
        let store = Arc::new(InMemoryMetadataStore::new(members.clone(), config.ack_timeout));
        let transport = Arc::new(InMemoryVerificationTransport::new());
        let collaborators = NodeCollaborators {
            store: Arc::clone(&store),
            usage: Arc::new(InFlightOperationsUsage),
            transport: Arc::clone(&transport),
            clock: Arc::new(DefaultClock),
        };

        let memory = Arc::new(InMemoryRepositoryFactory::new(blobs.clone()));
        let factories = RepositoryFactories::new()
            .with(repository_type(InMemoryRepositoryFactory::TYPE), memory.clone())
            .with(repository_type("memtype"), memory.clone())
            .with(
                repository_type(FsRepositoryFactory::TYPE),
                Arc::new(FsRepositoryFactory),
            );
        let internal = RepositoryFactories::new()
            .with(repository_type(InMemoryRepositoryFactory::TYPE), memory);

        let nodes: Vec<TestNode> = members
            .into_iter()
            .map(|member| {
                let node = RepositoryNode::start(
                    member,
                    factories.clone(),
                    internal.clone(),
                    config.clone(),
                    collaborators.clone(),
                )
                .expect("registry node should start");
                transport
                    .connect(node.verification_handler())
                    .expect("handler should connect");
                node
            })
            .collect();

        Self {
            store,
            transport,
            blobs,
            nodes,
        }
    }

    /// Starts a cluster of `count` master-and-data members named `n1..`.
    #[must_use]
    pub fn hosting(count: usize) -> Self {
        Self::start((1..=count).map(|index| hosting(&format!("n{index}"))).collect())
    }

    /// Returns the member named `id`.
    ///
    /// # Panics
    ///
    /// Panics when no such member exists.
    #[must_use]
    pub fn node(&self, id: &str) -> &TestNode {
        self.nodes
            .iter()
            .find(|node| node.local().id().as_str() == id)
            .unwrap_or_else(|| panic!("no member named {id}"))
    }

    /// Returns the repository names registered in cluster metadata.
    #[must_use]
    pub fn registered_names(&self) -> Vec<String> {
        self.store
            .state()
            .repositories()
            .iter()
            .map(|descriptor| descriptor.name().as_str().to_owned())
            .collect()
    }

    /// Stops every member.
    pub async fn shutdown(&self) {
        for node in &self.nodes {
            node.shutdown().await;
        }
    }
}

/// Installs a test-writer subscriber filtered by `RUST_LOG`.
///
/// Only the first call in a test binary takes effect.
pub fn init_tracing() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer();
    drop(subscriber.try_init());
}

/// Builds a member holding `roles`.
#[must_use]
pub fn member(id: &str, roles: &[NodeRole]) -> DiscoveryNode {
    DiscoveryNode::new(node_id(id), roles.iter().copied().collect())
}

/// Builds a master-and-data member.
#[must_use]
pub fn hosting(id: &str) -> DiscoveryNode {
    member(id, &[NodeRole::Master, NodeRole::Data])
}

/// Builds a coordinating-only member.
#[must_use]
pub fn coordinating(id: &str) -> DiscoveryNode {
    member(id, &[NodeRole::Coordinating])
}

/// Parses a node identifier.
#[must_use]
pub fn node_id(id: &str) -> NodeId {
    NodeId::new(id).expect("valid node id")
}

/// Parses a repository name.
#[must_use]
pub fn name(value: &str) -> RepositoryName {
    RepositoryName::new(value).expect("valid repository name")
}

/// Parses a backend type.
#[must_use]
pub fn repository_type(value: &str) -> RepositoryType {
    RepositoryType::new(value).expect("valid repository type")
}
