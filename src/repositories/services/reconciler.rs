//! Applies replicated descriptor snapshots to the node's live instances.

use super::{FactorySet, LiveRepositories, RepositoryMap};
use crate::repositories::{
    domain::{ClusterState, DescriptorSnapshot, RepositoryDescriptor},
    ports::StateSubscription,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Diffs desired descriptors against live instances and publishes the result.
///
/// A reconciler is owned by exactly one applier task, so reconciliations
/// never overlap and each result is published before the next snapshot is
/// looked at.
///
/// A descriptor whose construction fails is left out of the published map
/// and is only retried when a later snapshot differs from the applied one.
#[derive(Debug)]
pub struct RepositoryReconciler {
    repositories: Arc<LiveRepositories>,
    applied: Option<DescriptorSnapshot>,
}

impl RepositoryReconciler {
    /// Creates a reconciler publishing into `repositories`.
    #[must_use]
    pub const fn new(repositories: Arc<LiveRepositories>) -> Self {
        Self {
            repositories,
            applied: None,
        }
    }

    /// Makes the external live map match `state` and returns the published
    /// map.
    pub async fn reconcile(&mut self, state: &ClusterState) -> Arc<RepositoryMap> {
        let desired = state.repositories();
        let unchanged = self
            .applied
            .as_ref()
            .map_or_else(|| desired.is_empty(), |applied| applied == desired);
        if unchanged {
            return self.repositories.external();
        }

        trace!(version = state.version(), "processing new repositories");
        let factory = self.repositories.factory();
        let current = self.repositories.external();

        let mut survivors = RepositoryMap::with_capacity(current.len());
        for (name, repository) in current.iter() {
            if desired.contains(name) {
                survivors.insert(name.clone(), repository.clone());
            } else {
                debug!(repository = %name, "unregistering repository");
                factory.close(repository).await;
            }
        }

        let mut next = RepositoryMap::with_capacity(desired.len());
        for descriptor in desired.iter() {
            let name = descriptor.name();
            let repository = match survivors.remove(name) {
                Some(existing) if existing.descriptor().same_binding(descriptor) => Some(existing),
                Some(existing) => {
                    debug!(repository = %name, "updating repository");
                    factory.close(&existing).await;
                    self.create(descriptor, "failed to change repository").await
                }
                None => self.create(descriptor, "failed to create repository").await,
            };
            if let Some(repository) = repository {
                debug!(repository = %name, "registering repository");
                next.insert(name.clone(), repository);
            }
        }

        self.repositories.publish_external(next);
        self.applied = Some(desired.clone());
        self.repositories.external()
    }

    async fn create(
        &self,
        descriptor: &RepositoryDescriptor,
        context: &'static str,
    ) -> Option<super::LiveRepository> {
        match self
            .repositories
            .factory()
            .create(descriptor, FactorySet::User)
            .await
        {
            Ok(repository) => Some(repository),
            Err(err) => {
                warn!(repository = %descriptor.name(), error = %err, "{context}");
                None
            }
        }
    }

    /// Runs the applier loop on a background task.
    ///
    /// Each delivered state is reconciled and then acknowledged. The loop ends
    /// when `shutdown` is cancelled or the subscription closes.
    #[must_use]
    pub fn spawn(
        mut self,
        mut subscription: StateSubscription,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let delivery = tokio::select! {
                    () = shutdown.cancelled() => break,
                    delivery = subscription.recv() => delivery,
                };
                let Some(delivery) = delivery else {
                    break;
                };
                self.reconcile(delivery.state()).await;
                delivery.acknowledge();
            }
            debug!("repository applier stopped");
        })
    }
}
