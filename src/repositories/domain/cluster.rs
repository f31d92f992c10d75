//! Immutable cluster state delivered to every node on each metadata change.

use super::{DescriptorSnapshot, DiscoveryNode, NodeId, RepositoryName};
use serde::{Deserialize, Serialize};

/// Kind of long-running operation that pins a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// A snapshot is being written to the repository.
    Snapshot,
    /// A snapshot is being restored from the repository.
    Restore,
    /// Snapshots are being deleted from the repository.
    SnapshotDeletion,
}

/// An in-flight operation recorded in cluster state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InFlightOperation {
    kind: OperationKind,
    repository: RepositoryName,
}

impl InFlightOperation {
    /// Creates an in-flight operation record.
    #[must_use]
    pub const fn new(kind: OperationKind, repository: RepositoryName) -> Self {
        Self { kind, repository }
    }

    /// Returns the operation kind.
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Returns the repository the operation uses.
    #[must_use]
    pub const fn repository(&self) -> &RepositoryName {
        &self.repository
    }
}

/// One version of replicated cluster state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterState {
    version: u64,
    nodes: Vec<DiscoveryNode>,
    repositories: DescriptorSnapshot,
    operations: Vec<InFlightOperation>,
}

impl ClusterState {
    /// Creates the initial state for a set of nodes.
    #[must_use]
    pub const fn initial(nodes: Vec<DiscoveryNode>) -> Self {
        Self {
            version: 0,
            nodes,
            repositories: DescriptorSnapshot::empty(),
            operations: Vec::new(),
        }
    }

    /// Returns the metadata version.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Returns the cluster members.
    #[must_use]
    pub fn nodes(&self) -> &[DiscoveryNode] {
        &self.nodes
    }

    /// Looks up a member by identifier.
    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&DiscoveryNode> {
        self.nodes.iter().find(|node| node.id() == id)
    }

    /// Returns the replicated repository descriptors.
    #[must_use]
    pub const fn repositories(&self) -> &DescriptorSnapshot {
        &self.repositories
    }

    /// Returns the in-flight operations.
    #[must_use]
    pub fn operations(&self) -> &[InFlightOperation] {
        &self.operations
    }

    /// Returns the next version with `repositories` replaced.
    #[must_use]
    pub fn with_repositories(&self, repositories: DescriptorSnapshot) -> Self {
        Self {
            version: self.version + 1,
            nodes: self.nodes.clone(),
            repositories,
            operations: self.operations.clone(),
        }
    }

    /// Returns the next version with `operations` replaced.
    #[must_use]
    pub fn with_operations(&self, operations: Vec<InFlightOperation>) -> Self {
        Self {
            version: self.version + 1,
            nodes: self.nodes.clone(),
            repositories: self.repositories.clone(),
            operations,
        }
    }
}
