//! Cluster member identity and roles.

use super::{ParseNodeRoleError, RepositoryDomainError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Stable identifier of a cluster member.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Creates a node identifier.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryDomainError::EmptyNodeId`] when the value is blank.
    pub fn new(value: impl Into<String>) -> Result<Self, RepositoryDomainError> {
        let normalized = value.into().trim().to_owned();
        if normalized.is_empty() {
            return Err(RepositoryDomainError::EmptyNodeId);
        }
        Ok(Self(normalized))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Role a node plays in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    /// Eligible to be elected master.
    Master,
    /// Holds data.
    Data,
    /// Runs ingest pipelines.
    Ingest,
    /// Routes requests only.
    Coordinating,
}

impl NodeRole {
    /// Returns the canonical string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Master => "master",
            Self::Data => "data",
            Self::Ingest => "ingest",
            Self::Coordinating => "coordinating",
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for NodeRole {
    type Error = ParseNodeRoleError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "master" => Ok(Self::Master),
            "data" => Ok(Self::Data),
            "ingest" => Ok(Self::Ingest),
            "coordinating" => Ok(Self::Coordinating),
            _ => Err(ParseNodeRoleError(value.to_owned())),
        }
    }
}

/// Set of roles held by one node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeRoles(BTreeSet<NodeRole>);

impl NodeRoles {
    /// Master- and data-capable, the usual role set of a small cluster.
    #[must_use]
    pub fn master_and_data() -> Self {
        [NodeRole::Master, NodeRole::Data].into_iter().collect()
    }

    /// Returns `true` when the set includes `role`.
    #[must_use]
    pub fn contains(&self, role: NodeRole) -> bool {
        self.0.contains(&role)
    }

    /// Returns `true` when the node must host repository instances.
    ///
    /// Only master- and data-capable nodes hold repositories; other nodes
    /// neither apply repository metadata nor acknowledge its changes.
    #[must_use]
    pub fn can_host_repositories(&self) -> bool {
        self.contains(NodeRole::Master) || self.contains(NodeRole::Data)
    }
}

impl FromIterator<NodeRole> for NodeRoles {
    fn from_iter<I: IntoIterator<Item = NodeRole>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A cluster member as seen in cluster state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryNode {
    id: NodeId,
    roles: NodeRoles,
}

impl DiscoveryNode {
    /// Creates a discovery node.
    #[must_use]
    pub const fn new(id: NodeId, roles: NodeRoles) -> Self {
        Self { id, roles }
    }

    /// Returns the node identifier.
    #[must_use]
    pub const fn id(&self) -> &NodeId {
        &self.id
    }

    /// Returns the node roles.
    #[must_use]
    pub const fn roles(&self) -> &NodeRoles {
        &self.roles
    }

    /// Shorthand for [`NodeRoles::can_host_repositories`].
    #[must_use]
    pub fn can_host_repositories(&self) -> bool {
        self.roles.can_host_repositories()
    }
}
