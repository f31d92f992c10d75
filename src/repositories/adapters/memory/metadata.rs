//! In-process replicated metadata store simulating a cluster master.

use crate::repositories::{
    domain::{ClusterState, DiscoveryNode, InFlightOperation, NodeId, RepositoryName},
    ports::{
        AckPolicy, MetadataStore, MetadataStoreError, MetadataUpdate, ProposalAck, ProposeError,
        StateDelivery, StateSubscription,
    },
};
use arc_swap::ArcSwap;
use async_trait::async_trait;
use std::convert::Infallible;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Single-master metadata store for deterministic multi-node tests.
///
/// Proposals are serialized on an async mutex standing in for the master's
/// update thread. Each committed state is delivered to every subscriber in
/// commit order, and the proposer waits for the acknowledgements its policy
/// requires up to the configured timeout.
#[derive(Debug)]
pub struct InMemoryMetadataStore {
    state: ArcSwap<ClusterState>,
    subscribers: Mutex<Vec<Subscriber>>,
    master: tokio::sync::Mutex<()>,
    ack_timeout: Duration,
    pending_stale: AtomicU32,
}

#[derive(Debug)]
struct Subscriber {
    node: NodeId,
    sender: mpsc::UnboundedSender<StateDelivery>,
}

impl InMemoryMetadataStore {
    /// Creates a store whose initial state lists `nodes` and no repositories.
    #[must_use]
    pub fn new(nodes: Vec<DiscoveryNode>, ack_timeout: Duration) -> Self {
        Self {
            state: ArcSwap::from_pointee(ClusterState::initial(nodes)),
            subscribers: Mutex::new(Vec::new()),
            master: tokio::sync::Mutex::new(()),
            ack_timeout,
            pending_stale: AtomicU32::new(0),
        }
    }

    /// Makes the next `count` proposals fail as stale before evaluation.
    pub fn inject_stale(&self, count: u32) {
        self.pending_stale.fetch_add(count, Ordering::AcqRel);
    }

    /// Records an in-flight operation against `repository`.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataStoreError`] when the change cannot be committed.
    pub async fn begin_operation(
        &self,
        operation: InFlightOperation,
    ) -> Result<ProposalAck, MetadataStoreError> {
        self.update_operations("begin_operation", move |operations| {
            operations.push(operation);
        })
        .await
    }

    /// Removes every in-flight operation against `repository`.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataStoreError`] when the change cannot be committed.
    pub async fn finish_operations(
        &self,
        repository: RepositoryName,
    ) -> Result<ProposalAck, MetadataStoreError> {
        self.update_operations("finish_operations", move |operations| {
            operations.retain(|operation| *operation.repository() != repository);
        })
        .await
    }

    async fn update_operations<F>(
        &self,
        source: &str,
        edit: F,
    ) -> Result<ProposalAck, MetadataStoreError>
    where
        F: FnOnce(&mut Vec<InFlightOperation>) + Send + 'static,
    {
        let result = self
            .propose(source, AckPolicy::AllNodes, move |state: &ClusterState| {
                let mut operations = state.operations().to_vec();
                edit(&mut operations);
                Ok::<_, Infallible>(MetadataUpdate::Replace(state.with_operations(operations)))
            })
            .await;
        result.map_err(|err| match err {
            ProposeError::Store(err) => err,
            ProposeError::Rejected(never) => match never {},
        })
    }

    fn subscribers(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Publishes `next` and returns the acknowledgement receivers of the
    /// nodes `policy` requires, or `None` when a required node cannot ack.
    fn publish(
        &self,
        next: &Arc<ClusterState>,
        policy: AckPolicy,
    ) -> Option<Vec<oneshot::Receiver<()>>> {
        let mut subscribers = self.subscribers();
        self.state.store(Arc::clone(next));

        let mut receivers = Vec::new();
        let mut reachable = Vec::new();
        subscribers.retain(|subscriber| {
            let (delivery, applied) = StateDelivery::new(Arc::clone(next));
            if subscriber.sender.send(delivery).is_err() {
                debug!(node = %subscriber.node, "dropping closed state subscriber");
                return false;
            }
            reachable.push(subscriber.node.clone());
            let must_ack = next
                .node(&subscriber.node)
                .is_some_and(|node| policy.must_ack(node));
            if must_ack {
                receivers.push(applied);
            }
            true
        });

        let all_required_reachable = next
            .nodes()
            .iter()
            .filter(|node| policy.must_ack(node))
            .all(|node| reachable.contains(node.id()));
        all_required_reachable.then_some(receivers)
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    fn state(&self) -> Arc<ClusterState> {
        self.state.load_full()
    }

    fn subscribe(&self, node: &NodeId) -> StateSubscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut subscribers = self.subscribers();
        let (initial, _applied) = StateDelivery::new(self.state.load_full());
        if sender.send(initial).is_ok() {
            subscribers.push(Subscriber {
                node: node.clone(),
                sender,
            });
        }
        receiver
    }

    async fn propose<F, E>(
        &self,
        source: &str,
        policy: AckPolicy,
        mutation: F,
    ) -> Result<ProposalAck, ProposeError<E>>
    where
        F: FnOnce(&ClusterState) -> Result<MetadataUpdate, E> + Send + 'static,
        E: Send + 'static,
    {
        let _master = self.master.lock().await;
        let current = self.state.load_full();

        let stale = self
            .pending_stale
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |pending| {
                pending.checked_sub(1)
            })
            .is_ok();
        if stale {
            return Err(MetadataStoreError::Stale(current.version()).into());
        }

        let next = match mutation(&current).map_err(ProposeError::Rejected)? {
            MetadataUpdate::Unchanged => {
                return Ok(ProposalAck {
                    acknowledged: true,
                    changed: false,
                    version: current.version(),
                });
            }
            MetadataUpdate::Replace(next) => Arc::new(next),
        };
        if next.version() <= current.version() {
            return Err(MetadataStoreError::Stale(current.version()).into());
        }

        debug!(source, version = next.version(), "publishing cluster state");
        let acknowledged = match self.publish(&next, policy) {
            Some(receivers) => {
                let all_applied = async {
                    for applied in receivers {
                        if applied.await.is_err() {
                            return false;
                        }
                    }
                    true
                };
                tokio::time::timeout(self.ack_timeout, all_applied)
                    .await
                    .unwrap_or(false)
            }
            None => false,
        };
        if !acknowledged {
            warn!(
                source,
                version = next.version(),
                timeout = ?self.ack_timeout,
                "cluster state was not acknowledged by every required node"
            );
        }

        Ok(ProposalAck {
            acknowledged,
            changed: true,
            version: next.version(),
        })
    }
}
