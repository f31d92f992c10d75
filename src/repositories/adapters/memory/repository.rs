//! In-memory blob-store backend for simulated clusters.
//!
//! Every node's factory shares one [`InMemoryBlobStore`], so blobs written by
//! one member are visible to all others, as with a real shared object store.
//! The store also carries failure injection and lifecycle counters used by
//! tests.

use crate::repositories::{
    domain::{DiscoveryNode, NodeId, RepositoryDescriptor, RepositoryName, VerificationToken},
    ports::{Repository, RepositoryBackendError, RepositoryBackendResult, RepositoryFactory},
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

/// Lifecycle counters aggregated over every instance of a blob store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlobStoreCounters {
    /// Instances built by a factory.
    pub created: usize,
    /// Instances whose `start` succeeded.
    pub started: usize,
    /// Instances closed.
    pub closed: usize,
    /// Verification rounds started.
    pub verifications_started: usize,
    /// Verification rounds ended.
    pub verifications_ended: usize,
    /// Node probes answered, successful or not.
    pub probes: usize,
}

/// Shared in-memory object store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBlobStore {
    state: Arc<RwLock<BlobStoreState>>,
}

#[derive(Debug, Default)]
struct BlobStoreState {
    blobs: BTreeMap<String, Vec<u8>>,
    denied_nodes: HashMap<NodeId, String>,
    failing_cleanup: bool,
    open: HashMap<RepositoryName, usize>,
    peak_open: HashMap<RepositoryName, usize>,
    counters: BlobStoreCounters,
}

impl InMemoryBlobStore {
    /// Creates an empty blob store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RepositoryBackendResult<RwLockReadGuard<'_, BlobStoreState>> {
        self.state
            .read()
            .map_err(|err| RepositoryBackendError::runtime(std::io::Error::other(err.to_string())))
    }

    fn write(&self) -> RepositoryBackendResult<RwLockWriteGuard<'_, BlobStoreState>> {
        self.state
            .write()
            .map_err(|err| RepositoryBackendError::runtime(std::io::Error::other(err.to_string())))
    }

    /// Makes probes from `node` fail with `reason`.
    ///
    /// # Errors
    ///
    /// Returns runtime errors when lock acquisition fails.
    pub fn deny_node(
        &self,
        node: NodeId,
        reason: impl Into<String>,
    ) -> RepositoryBackendResult<()> {
        self.write()?.denied_nodes.insert(node, reason.into());
        Ok(())
    }

    /// Makes `end_verification` fail until reset.
    ///
    /// # Errors
    ///
    /// Returns runtime errors when lock acquisition fails.
    pub fn set_failing_cleanup(&self, failing: bool) -> RepositoryBackendResult<()> {
        self.write()?.failing_cleanup = failing;
        Ok(())
    }

    /// Returns the stored blob paths in order.
    ///
    /// # Errors
    ///
    /// Returns runtime errors when lock acquisition fails.
    pub fn blob_paths(&self) -> RepositoryBackendResult<Vec<String>> {
        Ok(self.read()?.blobs.keys().cloned().collect())
    }

    /// Returns a snapshot of the lifecycle counters.
    ///
    /// # Errors
    ///
    /// Returns runtime errors when lock acquisition fails.
    pub fn counters(&self) -> RepositoryBackendResult<BlobStoreCounters> {
        Ok(self.read()?.counters)
    }

    /// Returns how many started instances of `name` are currently open.
    ///
    /// # Errors
    ///
    /// Returns runtime errors when lock acquisition fails.
    pub fn open_instances(&self, name: &RepositoryName) -> RepositoryBackendResult<usize> {
        Ok(self.read()?.open.get(name).copied().unwrap_or_default())
    }

    /// Returns the largest number of simultaneously open instances of `name`.
    ///
    /// # Errors
    ///
    /// Returns runtime errors when lock acquisition fails.
    pub fn peak_open_instances(&self, name: &RepositoryName) -> RepositoryBackendResult<usize> {
        Ok(self.read()?.peak_open.get(name).copied().unwrap_or_default())
    }
}

fn canary_prefix(name: &RepositoryName, token: &VerificationToken) -> String {
    format!("{name}/tests-{token}/")
}

/// Instance of the in-memory backend.
///
/// Recognised settings: `readonly` (declines verification), `fail_on_start`,
/// `fail_on_close` and `start_delay_ms`.
#[derive(Debug)]
pub struct InMemoryRepository {
    descriptor: RepositoryDescriptor,
    store: InMemoryBlobStore,
    readonly: bool,
    fail_on_start: bool,
    fail_on_close: bool,
    start_delay: Option<Duration>,
    started: AtomicBool,
    closed: AtomicBool,
}

impl InMemoryRepository {
    fn new(
        descriptor: RepositoryDescriptor,
        store: InMemoryBlobStore,
    ) -> RepositoryBackendResult<Self> {
        let settings = descriptor.settings();
        let readonly = settings.get_bool("readonly", false)?;
        let fail_on_start = settings.get_bool("fail_on_start", false)?;
        let fail_on_close = settings.get_bool("fail_on_close", false)?;
        let start_delay = settings.get_millis("start_delay_ms")?;
        Ok(Self {
            descriptor,
            store,
            readonly,
            fail_on_start,
            fail_on_close,
            start_delay,
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> RepositoryBackendResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RepositoryBackendError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    fn metadata(&self) -> &RepositoryDescriptor {
        &self.descriptor
    }

    async fn start(&self) -> RepositoryBackendResult<()> {
        if let Some(delay) = self.start_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_on_start {
            return Err(RepositoryBackendError::Unavailable(format!(
                "[{}] configured to fail on start",
                self.descriptor.name()
            )));
        }
        self.ensure_open()?;

        let mut state = self.store.write()?;
        let name = self.descriptor.name().clone();
        let open = state.open.entry(name.clone()).or_default();
        *open += 1;
        let current = *open;
        let peak = state.peak_open.entry(name).or_default();
        *peak = (*peak).max(current);
        state.counters.started += 1;
        self.started.store(true, Ordering::Release);
        Ok(())
    }

    async fn close(&self) -> RepositoryBackendResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut state = self.store.write()?;
        state.counters.closed += 1;
        if self.started.load(Ordering::Acquire)
            && let Some(open) = state.open.get_mut(self.descriptor.name())
        {
            *open = open.saturating_sub(1);
        }
        drop(state);

        if self.fail_on_close {
            return Err(RepositoryBackendError::Unavailable(format!(
                "[{}] configured to fail on close",
                self.descriptor.name()
            )));
        }
        Ok(())
    }

    async fn start_verification(&self) -> RepositoryBackendResult<Option<VerificationToken>> {
        self.ensure_open()?;
        if self.readonly {
            return Ok(None);
        }
        let token = VerificationToken::generate();
        let path = format!("{}master.dat", canary_prefix(self.descriptor.name(), &token));

        let mut state = self.store.write()?;
        state.blobs.insert(path, token.as_str().as_bytes().to_vec());
        state.counters.verifications_started += 1;
        Ok(Some(token))
    }

    async fn end_verification(&self, token: &VerificationToken) -> RepositoryBackendResult<()> {
        self.ensure_open()?;
        let prefix = canary_prefix(self.descriptor.name(), token);

        let mut state = self.store.write()?;
        state.counters.verifications_ended += 1;
        if state.failing_cleanup {
            return Err(RepositoryBackendError::Unavailable(format!(
                "cannot delete {prefix}"
            )));
        }
        state.blobs.retain(|path, _| !path.starts_with(&prefix));
        Ok(())
    }

    async fn verify(
        &self,
        token: &VerificationToken,
        node: &DiscoveryNode,
    ) -> RepositoryBackendResult<()> {
        self.ensure_open()?;
        let prefix = canary_prefix(self.descriptor.name(), token);

        let mut state = self.store.write()?;
        state.counters.probes += 1;
        if let Some(reason) = state.denied_nodes.get(node.id()) {
            return Err(RepositoryBackendError::VerificationFailed(format!(
                "store is not accessible on node [{}]: {reason}",
                node.id()
            )));
        }
        let master = format!("{prefix}master.dat");
        if state.blobs.get(&master).map(Vec::as_slice) != Some(token.as_str().as_bytes()) {
            return Err(RepositoryBackendError::VerificationFailed(format!(
                "store location [{prefix}] is not shared between node [{}] and the master node",
                node.id()
            )));
        }
        let data = format!("{prefix}data-{}.dat", node.id());
        state.blobs.insert(data, token.as_str().as_bytes().to_vec());
        Ok(())
    }
}

/// Factory building [`InMemoryRepository`] instances over one shared store.
#[derive(Debug, Clone)]
pub struct InMemoryRepositoryFactory {
    store: InMemoryBlobStore,
}

impl InMemoryRepositoryFactory {
    /// Backend type name registered by default.
    pub const TYPE: &'static str = "memory";

    /// Creates a factory over `store`.
    #[must_use]
    pub const fn new(store: InMemoryBlobStore) -> Self {
        Self { store }
    }
}

impl RepositoryFactory for InMemoryRepositoryFactory {
    fn create(
        &self,
        descriptor: &RepositoryDescriptor,
    ) -> RepositoryBackendResult<Arc<dyn Repository>> {
        let repository = InMemoryRepository::new(descriptor.clone(), self.store.clone())?;
        self.store.write()?.counters.created += 1;
        Ok(Arc::new(repository))
    }
}
