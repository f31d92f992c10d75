//! Published live instance maps and the read path over them.
//!
//! Two maps are held: the external map, owned by the reconciler and derived
//! from cluster metadata, and the internal map for system-registered
//! repositories. Both are immutable once published and replaced wholesale
//! through [`ArcSwap`], so readers never lock and never observe a partially
//! applied update.

use super::{
    FactorySet, InstanceFactory, LiveRepository, RepositoryServiceError, RepositoryServiceResult,
};
use crate::repositories::domain::{
    RepositoryDescriptor, RepositoryName, RepositorySettings, RepositoryType,
};
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Immutable `name -> instance` map.
pub type RepositoryMap = HashMap<RepositoryName, LiveRepository>;

/// Repository access facade over the external and internal maps.
#[derive(Debug)]
pub struct LiveRepositories {
    external: ArcSwap<RepositoryMap>,
    internal: ArcSwap<RepositoryMap>,
    internal_writer: Mutex<()>,
    factory: InstanceFactory,
}

impl LiveRepositories {
    /// Creates empty maps backed by `factory`.
    #[must_use]
    pub fn new(factory: InstanceFactory) -> Self {
        Self {
            external: ArcSwap::from_pointee(RepositoryMap::new()),
            internal: ArcSwap::from_pointee(RepositoryMap::new()),
            internal_writer: Mutex::new(()),
            factory,
        }
    }

    /// Returns the instance factory shared with the reconciler.
    #[must_use]
    pub const fn factory(&self) -> &InstanceFactory {
        &self.factory
    }

    /// Looks up a live repository, external map first.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryServiceError::RepositoryNotFound`] when neither map
    /// holds `name`.
    pub fn get(&self, name: &RepositoryName) -> RepositoryServiceResult<LiveRepository> {
        if let Some(repository) = self.external.load().get(name) {
            return Ok(repository.clone());
        }
        if let Some(repository) = self.internal.load().get(name) {
            return Ok(repository.clone());
        }
        Err(RepositoryServiceError::not_found(name))
    }

    /// Returns descriptors of every external live repository, sorted by name.
    #[must_use]
    pub fn list(&self) -> Vec<RepositoryDescriptor> {
        let mut descriptors: Vec<_> = self
            .external
            .load()
            .values()
            .map(|repository| repository.descriptor().clone())
            .collect();
        descriptors.sort_by(|left, right| left.name().cmp(right.name()));
        descriptors
    }

    /// Returns the currently published external map.
    #[must_use]
    pub fn external(&self) -> Arc<RepositoryMap> {
        self.external.load_full()
    }

    /// Returns the currently published internal map.
    #[must_use]
    pub fn internal(&self) -> Arc<RepositoryMap> {
        self.internal.load_full()
    }

    /// Publishes a new external map in one atomic swap.
    pub(crate) fn publish_external(&self, repositories: RepositoryMap) {
        for name in repositories.keys() {
            if self.internal.load().contains_key(name) {
                warn!(
                    repository = %name,
                    "non-internal repository shadows the internal repository of the same name"
                );
            }
        }
        self.external.store(Arc::new(repositories));
    }

    /// Registers a system repository of `repository_type` with empty settings.
    ///
    /// Registration is compute-if-absent: an internal repository already
    /// registered under `name` is kept, with a warning when its type differs.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryServiceError::RepositoryTypeNotFound`] or
    /// [`RepositoryServiceError::RepositoryConstructionFailed`] when the
    /// internal factory set cannot build the repository.
    pub async fn register_internal(
        &self,
        name: RepositoryName,
        repository_type: RepositoryType,
    ) -> RepositoryServiceResult<LiveRepository> {
        let _writer = self.internal_writer.lock().await;
        let current = self.internal.load_full();

        let repository = if let Some(existing) = current.get(&name) {
            existing.clone()
        } else {
            debug!(
                repository = %name,
                repository_type = %repository_type,
                "put internal repository"
            );
            let descriptor = RepositoryDescriptor::new(
                name.clone(),
                repository_type.clone(),
                RepositorySettings::empty(),
            );
            let created = self.factory.create(&descriptor, FactorySet::Internal).await?;
            let mut next = RepositoryMap::clone(&current);
            next.insert(name.clone(), created.clone());
            self.internal.store(Arc::new(next));
            created
        };

        let registered_type = repository.descriptor().repository_type();
        if *registered_type != repository_type {
            warn!(
                repository = %name,
                registered_type = %registered_type,
                requested_type = %repository_type,
                "internal repository already registered with another type; registration ignored"
            );
        } else if self.external.load().contains_key(&name) {
            warn!(
                repository = %name,
                repository_type = %repository_type,
                "non-internal repository already registered; it blocks the internal repository"
            );
        }
        Ok(repository)
    }

    /// Removes and closes an internal repository. Absent names are ignored.
    pub async fn unregister_internal(&self, name: &RepositoryName) {
        let _writer = self.internal_writer.lock().await;
        let current = self.internal.load_full();
        let Some(repository) = current.get(name).cloned() else {
            return;
        };

        let mut next = RepositoryMap::clone(&current);
        next.remove(name);
        self.internal.store(Arc::new(next));
        debug!(
            repository = %name,
            repository_type = %repository.descriptor().repository_type(),
            "delete internal repository"
        );
        self.factory.close(&repository).await;
    }

    /// Publishes empty maps and closes every instance.
    pub(crate) async fn close_all(&self) {
        let _writer = self.internal_writer.lock().await;
        let external = self.external.swap(Arc::new(RepositoryMap::new()));
        let internal = self.internal.swap(Arc::new(RepositoryMap::new()));
        for repository in external.values().chain(internal.values()) {
            self.factory.close(repository).await;
        }
    }
}
