//! Composition root wiring the registry for one cluster member.

use super::{
    InstanceFactory, LiveRepositories, LiveRepository, NodeVerificationHandler, RegisterOutcome,
    RegisterRepositoryRequest, RegistryConfig, RepositoryFactories, RepositoryMutationService,
    RepositoryReconciler, RepositoryServiceResult, RepositoryVerificationService,
    VerificationSessions,
};
use crate::repositories::{
    domain::{
        DiscoveryNode, RepositoryDescriptor, RepositoryName, RepositoryType, VerificationReport,
    },
    ports::{MetadataStore, ProposalAck, RepositoryUsage, VerificationTransport},
};
use mockable::Clock;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// External collaborators shared by every node of a cluster.
#[derive(Debug)]
pub struct NodeCollaborators<S, U, T, C> {
    /// Replicated metadata store.
    pub store: Arc<S>,
    /// In-flight operation query.
    pub usage: Arc<U>,
    /// Probe transport.
    pub transport: Arc<T>,
    /// Time source for verification reports.
    pub clock: Arc<C>,
}

impl<S, U, T, C> Clone for NodeCollaborators<S, U, T, C> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            usage: Arc::clone(&self.usage),
            transport: Arc::clone(&self.transport),
            clock: Arc::clone(&self.clock),
        }
    }
}

/// The repository registry as run by one cluster member.
///
/// Master- and data-capable members subscribe to cluster metadata and run an
/// applier task; other members hold no repositories.
pub struct RepositoryNode<S, U, T, C>
where
    S: MetadataStore + 'static,
    U: RepositoryUsage + 'static,
    T: VerificationTransport + 'static,
    C: Clock + Send + Sync + 'static,
{
    local: DiscoveryNode,
    repositories: Arc<LiveRepositories>,
    verification: RepositoryVerificationService<S, T, C>,
    mutation: RepositoryMutationService<S, U, T, C>,
    applier: Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl<S, U, T, C> RepositoryNode<S, U, T, C>
where
    S: MetadataStore + 'static,
    U: RepositoryUsage + 'static,
    T: VerificationTransport + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Starts the registry for `local`.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`super::RepositoryServiceError::Config`] when `config` holds a
    /// zero timeout.
    pub fn start(
        local: DiscoveryNode,
        factories: RepositoryFactories,
        internal_factories: RepositoryFactories,
        config: RegistryConfig,
        collaborators: NodeCollaborators<S, U, T, C>,
    ) -> RepositoryServiceResult<Self> {
        config.validate()?;
        let NodeCollaborators {
            store,
            usage,
            transport,
            clock,
        } = collaborators;

        let repositories = Arc::new(LiveRepositories::new(InstanceFactory::new(
            factories,
            internal_factories,
            config,
        )));
        let verification = RepositoryVerificationService::new(
            local.clone(),
            Arc::clone(&repositories),
            Arc::clone(&store),
            transport,
            clock,
        );
        let mutation = RepositoryMutationService::new(
            Arc::clone(&store),
            usage,
            Arc::clone(&repositories),
            verification.clone(),
        );

        let shutdown = CancellationToken::new();
        let applier = if local.can_host_repositories() {
            let subscription = store.subscribe(local.id());
            let reconciler = RepositoryReconciler::new(Arc::clone(&repositories));
            Some(reconciler.spawn(subscription, shutdown.clone()))
        } else {
            debug!(node = %local.id(), "node does not host repositories; applier not started");
            None
        };

        Ok(Self {
            local,
            repositories,
            verification,
            mutation,
            applier: Mutex::new(applier),
            shutdown,
        })
    }

    /// Returns the member this registry runs on.
    #[must_use]
    pub const fn local(&self) -> &DiscoveryNode {
        &self.local
    }

    /// Returns the live repository facade.
    #[must_use]
    pub const fn repositories(&self) -> &Arc<LiveRepositories> {
        &self.repositories
    }

    /// Returns the handler answering probes addressed to this member.
    #[must_use]
    pub fn verification_handler(&self) -> NodeVerificationHandler {
        NodeVerificationHandler::new(self.local.clone(), Arc::clone(&self.repositories))
    }

    /// Returns the verification sessions started from this member.
    #[must_use]
    pub fn verification_sessions(&self) -> &VerificationSessions {
        self.verification.sessions()
    }

    /// Looks up a live repository.
    ///
    /// # Errors
    ///
    /// Returns [`super::RepositoryServiceError::RepositoryNotFound`] when no
    /// live instance carries `name`.
    pub fn get(&self, name: &RepositoryName) -> RepositoryServiceResult<LiveRepository> {
        self.repositories.get(name)
    }

    /// Lists descriptors of the external live repositories.
    #[must_use]
    pub fn list(&self) -> Vec<RepositoryDescriptor> {
        self.repositories.list()
    }

    /// Registers or updates a repository through cluster metadata.
    ///
    /// # Errors
    ///
    /// See [`RepositoryMutationService::register`].
    pub async fn register(
        &self,
        request: RegisterRepositoryRequest,
    ) -> RepositoryServiceResult<RegisterOutcome> {
        self.mutation.register(request).await
    }

    /// Unregisters every repository matching `pattern`.
    ///
    /// # Errors
    ///
    /// See [`RepositoryMutationService::unregister`].
    pub async fn unregister(&self, pattern: &str) -> RepositoryServiceResult<ProposalAck> {
        self.mutation.unregister(pattern).await
    }

    /// Verifies a live repository across the cluster.
    ///
    /// # Errors
    ///
    /// See [`RepositoryVerificationService::verify`].
    pub async fn verify(
        &self,
        name: &RepositoryName,
    ) -> RepositoryServiceResult<VerificationReport> {
        self.verification.verify(name).await
    }

    /// Registers a system repository on this member only.
    ///
    /// # Errors
    ///
    /// See [`LiveRepositories::register_internal`].
    pub async fn register_internal(
        &self,
        name: RepositoryName,
        repository_type: RepositoryType,
    ) -> RepositoryServiceResult<LiveRepository> {
        self.repositories
            .register_internal(name, repository_type)
            .await
    }

    /// Removes a system repository from this member.
    pub async fn unregister_internal(&self, name: &RepositoryName) {
        self.repositories.unregister_internal(name).await;
    }

    /// Stops the applier and closes every live instance.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let applier = self
            .applier
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = applier
            && let Err(err) = handle.await
        {
            warn!(node = %self.local.id(), error = %err, "repository applier failed");
        }
        self.repositories.close_all().await;
        info!(node = %self.local.id(), "repository registry stopped");
    }
}
