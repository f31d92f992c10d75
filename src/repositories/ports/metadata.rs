//! Port for the consensus-replicated metadata holding repository descriptors.

use crate::repositories::domain::{ClusterState, DiscoveryNode, NodeId};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Which nodes must acknowledge a committed change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckPolicy {
    /// Every cluster member.
    AllNodes,
    /// Master- and data-capable members only.
    RepositoryHosts,
}

impl AckPolicy {
    /// Returns whether `node` must acknowledge under this policy.
    #[must_use]
    pub fn must_ack(self, node: &DiscoveryNode) -> bool {
        match self {
            Self::AllNodes => true,
            Self::RepositoryHosts => node.can_host_repositories(),
        }
    }
}

/// Result of evaluating a mutation against the current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataUpdate {
    /// Nothing changed; no new version is published.
    Unchanged,
    /// Publish this state as the next version.
    Replace(ClusterState),
}

/// Outcome of a committed proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProposalAck {
    /// Whether every node required by the policy applied the change in time.
    pub acknowledged: bool,
    /// Whether a new version was published.
    pub changed: bool,
    /// The version current after the proposal.
    pub version: u64,
}

/// Errors raised by the replication layer itself.
#[derive(Debug, Clone, Error)]
pub enum MetadataStoreError {
    /// The mutation was computed against a state that is no longer current.
    #[error("proposal based on stale cluster state version {0}")]
    Stale(u64),

    /// The change could not be replicated.
    #[error("metadata replication failed: {0}")]
    Replication(Arc<dyn std::error::Error + Send + Sync>),
}

impl MetadataStoreError {
    /// Wraps a replication-layer failure.
    pub fn replication(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Replication(Arc::new(err))
    }
}

/// Failure of a proposal: either the mutation vetoed it or the store failed.
#[derive(Debug, Error)]
pub enum ProposeError<E> {
    /// The mutation rejected the change.
    #[error("proposal rejected")]
    Rejected(E),

    /// The store could not commit the change.
    #[error(transparent)]
    Store(#[from] MetadataStoreError),
}

/// A committed state handed to one node, acknowledged once applied.
#[derive(Debug)]
pub struct StateDelivery {
    state: Arc<ClusterState>,
    applied: oneshot::Sender<()>,
}

impl StateDelivery {
    /// Creates a delivery and the receiver that observes its acknowledgement.
    #[must_use]
    pub fn new(state: Arc<ClusterState>) -> (Self, oneshot::Receiver<()>) {
        let (applied, receiver) = oneshot::channel();
        (Self { state, applied }, receiver)
    }

    /// Returns the delivered state.
    #[must_use]
    pub const fn state(&self) -> &Arc<ClusterState> {
        &self.state
    }

    /// Signals that the state has been applied locally.
    pub fn acknowledge(self) {
        // The proposer may have stopped waiting after its ack timeout.
        self.applied.send(()).ok();
    }
}

/// Ordered stream of committed states for one node.
pub type StateSubscription = mpsc::UnboundedReceiver<StateDelivery>;

/// Replicated metadata store.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Returns the latest committed state.
    fn state(&self) -> Arc<ClusterState>;

    /// Subscribes `node` to committed states, starting with the current one.
    fn subscribe(&self, node: &NodeId) -> StateSubscription;

    /// Evaluates `mutation` against the current state and commits the result.
    ///
    /// Waits until every node selected by `policy` acknowledged the new
    /// version, or until the store's acknowledgement timeout, in which case
    /// the returned [`ProposalAck::acknowledged`] is `false`.
    ///
    /// # Errors
    ///
    /// Returns [`ProposeError::Rejected`] when the mutation fails and
    /// [`ProposeError::Store`] when the change cannot be committed. A
    /// [`MetadataStoreError::Stale`] failure may be retried.
    async fn propose<F, E>(
        &self,
        source: &str,
        policy: AckPolicy,
        mutation: F,
    ) -> Result<ProposalAck, ProposeError<E>>
    where
        F: FnOnce(&ClusterState) -> Result<MetadataUpdate, E> + Send + 'static,
        E: Send + 'static;
}
