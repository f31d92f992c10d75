//! Type-name to constructor registry and instance lifecycle helpers.

use super::{RegistryConfig, RepositoryServiceError, RepositoryServiceResult};
use crate::repositories::{
    domain::{RepositoryDescriptor, RepositoryName, RepositoryType},
    ports::{Repository, RepositoryBackendError, RepositoryFactory},
};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Namespace a descriptor's type is resolved in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactorySet {
    /// Backends users may declare in cluster metadata.
    User,
    /// Backends only the system registers.
    Internal,
}

/// Mapping from backend type name to its constructor.
#[derive(Clone, Default)]
pub struct RepositoryFactories {
    factories: HashMap<RepositoryType, Arc<dyn RepositoryFactory>>,
}

impl RepositoryFactories {
    /// Creates an empty factory set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` for `repository_type`, returning the updated set.
    #[must_use]
    pub fn with(
        mut self,
        repository_type: RepositoryType,
        factory: Arc<dyn RepositoryFactory>,
    ) -> Self {
        self.register(repository_type, factory);
        self
    }

    /// Registers `factory` for `repository_type`, replacing any previous one.
    pub fn register(
        &mut self,
        repository_type: RepositoryType,
        factory: Arc<dyn RepositoryFactory>,
    ) {
        self.factories.insert(repository_type, factory);
    }

    /// Looks up the factory for `repository_type`.
    #[must_use]
    pub fn get(&self, repository_type: &RepositoryType) -> Option<&Arc<dyn RepositoryFactory>> {
        self.factories.get(repository_type)
    }

    /// Returns the registered type names in sorted order.
    #[must_use]
    pub fn types(&self) -> Vec<&RepositoryType> {
        let mut types: Vec<_> = self.factories.keys().collect();
        types.sort();
        types
    }
}

impl fmt::Debug for RepositoryFactories {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RepositoryFactories")
            .field("types", &self.types())
            .finish()
    }
}

/// A started instance as published in a live map.
///
/// The lifetime token is cancelled when the instance is closed, which is how
/// outstanding verification sessions learn that their instance is gone.
#[derive(Debug, Clone)]
pub struct LiveRepository {
    instance: Arc<dyn Repository>,
    lifetime: CancellationToken,
}

impl LiveRepository {
    fn new(instance: Arc<dyn Repository>) -> Self {
        Self {
            instance,
            lifetime: CancellationToken::new(),
        }
    }

    /// Returns the descriptor the instance is bound to.
    #[must_use]
    pub fn descriptor(&self) -> &RepositoryDescriptor {
        self.instance.metadata()
    }

    /// Returns the repository name.
    #[must_use]
    pub fn name(&self) -> &RepositoryName {
        self.descriptor().name()
    }

    /// Returns the backend instance.
    #[must_use]
    pub const fn instance(&self) -> &Arc<dyn Repository> {
        &self.instance
    }

    /// Returns `true` once the instance has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lifetime.is_cancelled()
    }

    /// Returns a token cancelled when the instance is closed.
    #[must_use]
    pub fn lifetime(&self) -> CancellationToken {
        self.lifetime.clone()
    }

    /// Returns `true` when both handles refer to the same instance.
    #[must_use]
    pub fn same_instance(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.instance, &other.instance)
    }
}

/// Builds, starts and closes instances with bounded waits.
#[derive(Debug, Clone)]
pub struct InstanceFactory {
    user: Arc<RepositoryFactories>,
    internal: Arc<RepositoryFactories>,
    config: RegistryConfig,
}

impl InstanceFactory {
    /// Creates an instance factory over the two namespaces.
    #[must_use]
    pub fn new(
        user: RepositoryFactories,
        internal: RepositoryFactories,
        config: RegistryConfig,
    ) -> Self {
        Self {
            user: Arc::new(user),
            internal: Arc::new(internal),
            config,
        }
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Constructs and starts an instance for `descriptor`.
    ///
    /// When `start` fails or times out, the half-built instance is closed
    /// before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryServiceError::RepositoryTypeNotFound`] for an
    /// unknown type and [`RepositoryServiceError::RepositoryConstructionFailed`]
    /// when the backend cannot be built or started.
    pub async fn create(
        &self,
        descriptor: &RepositoryDescriptor,
        set: FactorySet,
    ) -> RepositoryServiceResult<LiveRepository> {
        let name = descriptor.name();
        let repository_type = descriptor.repository_type();
        debug!(repository = %name, repository_type = %repository_type, "creating repository");

        let factories = match set {
            FactorySet::User => &self.user,
            FactorySet::Internal => &self.internal,
        };
        let factory = factories.get(repository_type).ok_or_else(|| {
            RepositoryServiceError::RepositoryTypeNotFound {
                name: name.clone(),
                repository_type: repository_type.clone(),
            }
        })?;

        let instance = factory
            .create(descriptor)
            .map_err(|source| construction_failed(name, source))?;

        let started = tokio::time::timeout(self.config.construction_timeout, instance.start())
            .await
            .unwrap_or_else(|_| {
                Err(RepositoryBackendError::Unavailable(format!(
                    "start timed out after {:?}",
                    self.config.construction_timeout
                )))
            });

        let live = LiveRepository::new(instance);
        if let Err(source) = started {
            self.close(&live).await;
            return Err(construction_failed(name, source));
        }
        Ok(live)
    }

    /// Closes `repository`, logging and swallowing any failure.
    ///
    /// The lifetime token is cancelled before the backend is closed.
    pub async fn close(&self, repository: &LiveRepository) {
        let name = repository.name();
        debug!(
            repository = %name,
            repository_type = %repository.descriptor().repository_type(),
            "closing repository"
        );
        repository.lifetime.cancel();

        match tokio::time::timeout(self.config.close_timeout, repository.instance.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(repository = %name, error = %err, "failed to close repository"),
            Err(_) => warn!(
                repository = %name,
                timeout = ?self.config.close_timeout,
                "timed out closing repository"
            ),
        }
    }
}

fn construction_failed(
    name: &RepositoryName,
    source: RepositoryBackendError,
) -> RepositoryServiceError {
    debug!(repository = %name, error = %source, "failed to create repository");
    RepositoryServiceError::RepositoryConstructionFailed {
        name: name.clone(),
        source,
    }
}
