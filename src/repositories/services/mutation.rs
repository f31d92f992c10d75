//! Register and unregister requests proposed to the replicated metadata.

use super::{
    FactorySet, LiveRepositories, RepositoryServiceError, RepositoryServiceResult,
    RepositoryVerificationService,
};
use crate::repositories::{
    domain::{
        ClusterState, DescriptorChange, NamePattern, RepositoryDescriptor, RepositoryName,
        RepositorySettings, RepositoryType, VerificationReport,
    },
    ports::{
        AckPolicy, MetadataStore, MetadataStoreError, MetadataUpdate, ProposalAck, ProposeError,
        RepositoryUsage, VerificationTransport,
    },
};
use mockable::Clock;
use std::sync::Arc;
use tracing::{debug, info};

/// Request payload for registering or updating a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterRepositoryRequest {
    name: String,
    repository_type: String,
    settings: RepositorySettings,
    verify: bool,
}

impl RegisterRepositoryRequest {
    /// Creates a request with empty settings and verification enabled.
    #[must_use]
    pub fn new(name: impl Into<String>, repository_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            repository_type: repository_type.into(),
            settings: RepositorySettings::empty(),
            verify: true,
        }
    }

    /// Replaces the backend settings.
    #[must_use]
    pub fn with_settings(mut self, settings: RepositorySettings) -> Self {
        self.settings = settings;
        self
    }

    /// Adds one backend setting.
    #[must_use]
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings = self.settings.with(key, value);
        self
    }

    /// Sets whether the repository is verified after registration.
    #[must_use]
    pub const fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }
}

/// Result of a successful registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterOutcome {
    /// Whether every repository host applied the change in time.
    pub acknowledged: bool,
    /// Whether the descriptor set changed.
    pub changed: bool,
    /// Verification report, present when verification ran.
    pub verification: Option<VerificationReport>,
}

/// Validates mutation requests and proposes them to the metadata store.
pub struct RepositoryMutationService<S, U, T, C>
where
    S: MetadataStore + 'static,
    U: RepositoryUsage + 'static,
    T: VerificationTransport + 'static,
    C: Clock + Send + Sync + 'static,
{
    store: Arc<S>,
    usage: Arc<U>,
    repositories: Arc<LiveRepositories>,
    verification: RepositoryVerificationService<S, T, C>,
    max_retries: u32,
}

impl<S, U, T, C> RepositoryMutationService<S, U, T, C>
where
    S: MetadataStore + 'static,
    U: RepositoryUsage + 'static,
    T: VerificationTransport + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Creates a mutation service.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        usage: Arc<U>,
        repositories: Arc<LiveRepositories>,
        verification: RepositoryVerificationService<S, T, C>,
    ) -> Self {
        let max_retries = repositories.factory().config().max_proposal_retries;
        Self {
            store,
            usage,
            repositories,
            verification,
            max_retries,
        }
    }

    /// Registers or updates a repository.
    ///
    /// The descriptor is first built and closed locally so that unusable
    /// settings fail before anything is proposed. When `verify` is set and the
    /// change was acknowledged, the repository is verified; a verification
    /// failure fails the call but leaves the descriptor registered.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryServiceError::Domain`] for invalid input,
    /// [`RepositoryServiceError::VerificationUnavailable`] when `verify` is
    /// requested on a member that does not host repositories,
    /// construction errors from the local pre-check,
    /// [`RepositoryServiceError::RepositoryInUse`] when an in-flight operation
    /// references the name, store failures, and verification failures.
    pub async fn register(
        &self,
        request: RegisterRepositoryRequest,
    ) -> RepositoryServiceResult<RegisterOutcome> {
        let RegisterRepositoryRequest {
            name,
            repository_type,
            settings,
            verify,
        } = request;

        let descriptor = RepositoryDescriptor::new(
            RepositoryName::new(name)?,
            RepositoryType::new(repository_type)?,
            settings,
        );
        if verify {
            self.verification.ensure_can_verify()?;
        }
        self.check_constructible(&descriptor).await?;

        let ack = self
            .propose("put_repository", || {
                let usage = Arc::clone(&self.usage);
                let proposed = descriptor.clone();
                move |state: &ClusterState| put_repository(state, &*usage, proposed)
            })
            .await?;

        let verification = if verify && ack.acknowledged {
            Some(self.verification.verify(descriptor.name()).await?)
        } else {
            if verify {
                debug!(
                    repository = %descriptor.name(),
                    "change not acknowledged; skipping verification"
                );
            }
            None
        };

        Ok(RegisterOutcome {
            acknowledged: ack.acknowledged,
            changed: ack.changed,
            verification,
        })
    }

    /// Removes every repository whose name matches `pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryServiceError::Domain`] for an invalid pattern,
    /// [`RepositoryServiceError::RepositoryNotFound`] when nothing matches and
    /// the pattern is not `*`, [`RepositoryServiceError::RepositoryInUse`] when
    /// a match is referenced by an in-flight operation, and store failures.
    pub async fn unregister(&self, pattern: &str) -> RepositoryServiceResult<ProposalAck> {
        let parsed = NamePattern::new(pattern)?;
        self.propose("delete_repository", || {
            let usage = Arc::clone(&self.usage);
            let matcher = parsed.clone();
            move |state: &ClusterState| delete_repositories(state, &*usage, &matcher)
        })
        .await
    }

    async fn check_constructible(
        &self,
        descriptor: &RepositoryDescriptor,
    ) -> RepositoryServiceResult<()> {
        let factory = self.repositories.factory();
        let probe = factory.create(descriptor, FactorySet::User).await?;
        factory.close(&probe).await;
        Ok(())
    }

    async fn propose<M, F>(
        &self,
        source: &str,
        mutation: M,
    ) -> RepositoryServiceResult<ProposalAck>
    where
        M: Fn() -> F,
        F: FnOnce(&ClusterState) -> RepositoryServiceResult<MetadataUpdate> + Send + 'static,
    {
        let mut retries = 0;
        loop {
            match self
                .store
                .propose(source, AckPolicy::RepositoryHosts, mutation())
                .await
            {
                Ok(ack) => return Ok(ack),
                Err(ProposeError::Rejected(err)) => return Err(err),
                Err(ProposeError::Store(MetadataStoreError::Stale(version)))
                    if retries < self.max_retries =>
                {
                    retries += 1;
                    debug!(source, version, retries, "retrying stale proposal");
                }
                Err(ProposeError::Store(err)) => return Err(err.into()),
            }
        }
    }
}

fn ensure_not_in_use(
    state: &ClusterState,
    usage: &dyn RepositoryUsage,
    name: &RepositoryName,
) -> RepositoryServiceResult<()> {
    if usage.is_repository_referenced(state, name) {
        return Err(RepositoryServiceError::RepositoryInUse(name.clone()));
    }
    Ok(())
}

fn put_repository(
    state: &ClusterState,
    usage: &dyn RepositoryUsage,
    descriptor: RepositoryDescriptor,
) -> RepositoryServiceResult<MetadataUpdate> {
    let name = descriptor.name().clone();
    ensure_not_in_use(state, usage, &name)?;

    let (next, change) = state.repositories().upsert(descriptor);
    match change {
        DescriptorChange::Unchanged => return Ok(MetadataUpdate::Unchanged),
        DescriptorChange::Added => info!(repository = %name, "put repository"),
        DescriptorChange::Updated => info!(repository = %name, "update repository"),
    }
    Ok(MetadataUpdate::Replace(state.with_repositories(next)))
}

fn delete_repositories(
    state: &ClusterState,
    usage: &dyn RepositoryUsage,
    pattern: &NamePattern,
) -> RepositoryServiceResult<MetadataUpdate> {
    if let Some(literal) = pattern.literal_name() {
        ensure_not_in_use(state, usage, &literal)?;
    }

    let (next, removed) = state.repositories().remove_matching(pattern);
    if removed.is_empty() {
        if pattern.is_match_all() {
            return Ok(MetadataUpdate::Unchanged);
        }
        return Err(RepositoryServiceError::RepositoryNotFound(
            pattern.as_str().to_owned(),
        ));
    }

    for descriptor in &removed {
        ensure_not_in_use(state, usage, descriptor.name())?;
    }
    for descriptor in &removed {
        info!(repository = %descriptor.name(), "delete repository");
    }
    Ok(MetadataUpdate::Replace(state.with_repositories(next)))
}
