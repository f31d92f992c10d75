//! Cluster-wide verification handshake for a live repository.
//!
//! A round runs on a background task: the local instance issues a token,
//! the token is probed on every repository-hosting member, responses are
//! collected until all nodes answered or the timeout elapses, and the
//! local verification state is released. Sessions are tracked by token so
//! that late responses for a finished or cancelled round are discarded.

use super::{
    LiveRepositories, LiveRepository, RepositoryServiceError, RepositoryServiceResult,
};
use crate::repositories::{
    domain::{
        DiscoveryNode, NodeFailure, NodeId, RepositoryName, VerificationFailure,
        VerificationPhase, VerificationReport, VerificationToken,
    },
    ports::{MetadataStore, ProbeError, VerificationTransport, VerifyNodeRequest},
};
use mockable::Clock;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// State of one outstanding verification round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationSession {
    repository: RepositoryName,
    phase: VerificationPhase,
    outstanding: BTreeSet<NodeId>,
    responded: Vec<NodeId>,
    failures: Vec<NodeFailure>,
}

impl VerificationSession {
    fn new(repository: RepositoryName) -> Self {
        Self {
            repository,
            phase: VerificationPhase::TokenIssued,
            outstanding: BTreeSet::new(),
            responded: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Returns the repository under verification.
    #[must_use]
    pub const fn repository(&self) -> &RepositoryName {
        &self.repository
    }

    /// Returns the current phase.
    #[must_use]
    pub const fn phase(&self) -> VerificationPhase {
        self.phase
    }

    /// Returns nodes that have not answered yet.
    #[must_use]
    pub const fn outstanding(&self) -> &BTreeSet<NodeId> {
        &self.outstanding
    }

    fn advance(&mut self, target: VerificationPhase) {
        if self.phase.can_transition_to(target) {
            self.phase = target;
        } else {
            warn!(
                repository = %self.repository,
                from = %self.phase,
                to = %target,
                "ignoring invalid verification phase transition"
            );
        }
    }

    fn record(&mut self, node: &NodeId, outcome: Result<(), String>) {
        if !self.outstanding.remove(node) {
            return;
        }
        match outcome {
            Ok(()) => self.responded.push(node.clone()),
            Err(reason) => self.failures.push(NodeFailure::new(node.clone(), reason)),
        }
    }

    fn conclude(mut self) -> Self {
        let unanswered = std::mem::take(&mut self.outstanding);
        self.failures.extend(
            unanswered
                .into_iter()
                .map(|node| NodeFailure::new(node, "no response before verification timeout")),
        );
        let outcome = if self.failures.is_empty() {
            VerificationPhase::Success
        } else {
            VerificationPhase::PartialFailure
        };
        self.advance(outcome);
        self
    }
}

/// Registry of verification sessions keyed by token.
#[derive(Debug, Default)]
pub struct VerificationSessions {
    sessions: Mutex<HashMap<VerificationToken, VerificationSession>>,
}

impl VerificationSessions {
    fn lock(&self) -> MutexGuard<'_, HashMap<VerificationToken, VerificationSession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open(&self, token: &VerificationToken, repository: &RepositoryName) {
        self.lock()
            .insert(token.clone(), VerificationSession::new(repository.clone()));
    }

    fn await_responses<'a>(
        &self,
        token: &VerificationToken,
        nodes: impl IntoIterator<Item = &'a NodeId>,
    ) {
        if let Some(session) = self.lock().get_mut(token) {
            session.outstanding = nodes.into_iter().cloned().collect();
            session.advance(VerificationPhase::AwaitingResponses);
        }
    }

    /// Records one probe response. Returns `false` when the session is gone
    /// and the response was discarded.
    fn record(
        &self,
        token: &VerificationToken,
        node: &NodeId,
        outcome: Result<(), String>,
    ) -> bool {
        let mut sessions = self.lock();
        let Some(session) = sessions.get_mut(token) else {
            return false;
        };
        session.record(node, outcome);
        true
    }

    fn finish(&self, token: &VerificationToken) -> Option<VerificationSession> {
        self.lock().remove(token).map(VerificationSession::conclude)
    }

    /// Returns the phase of the session running for `repository`.
    #[must_use]
    pub fn phase(&self, repository: &RepositoryName) -> VerificationPhase {
        self.lock()
            .values()
            .find(|session| session.repository() == repository)
            .map_or(VerificationPhase::Idle, VerificationSession::phase)
    }

    /// Returns the number of sessions still open.
    #[must_use]
    pub fn active(&self) -> usize {
        self.lock().len()
    }
}

/// Drives verification rounds from the node that received the request.
pub struct RepositoryVerificationService<S, T, C>
where
    S: MetadataStore + 'static,
    T: VerificationTransport + 'static,
    C: Clock + Send + Sync + 'static,
{
    local: DiscoveryNode,
    repositories: Arc<LiveRepositories>,
    store: Arc<S>,
    transport: Arc<T>,
    clock: Arc<C>,
    sessions: Arc<VerificationSessions>,
    timeout: Duration,
}

impl<S, T, C> Clone for RepositoryVerificationService<S, T, C>
where
    S: MetadataStore + 'static,
    T: VerificationTransport + 'static,
    C: Clock + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            local: self.local.clone(),
            repositories: Arc::clone(&self.repositories),
            store: Arc::clone(&self.store),
            transport: Arc::clone(&self.transport),
            clock: Arc::clone(&self.clock),
            sessions: Arc::clone(&self.sessions),
            timeout: self.timeout,
        }
    }
}

impl<S, T, C> RepositoryVerificationService<S, T, C>
where
    S: MetadataStore + 'static,
    T: VerificationTransport + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Creates a verification service for the node `local`.
    #[must_use]
    pub fn new(
        local: DiscoveryNode,
        repositories: Arc<LiveRepositories>,
        store: Arc<S>,
        transport: Arc<T>,
        clock: Arc<C>,
    ) -> Self {
        let timeout = repositories.factory().config().verification_timeout;
        Self {
            local,
            repositories,
            store,
            transport,
            clock,
            sessions: Arc::new(VerificationSessions::default()),
            timeout,
        }
    }

    /// Returns the session registry.
    #[must_use]
    pub fn sessions(&self) -> &VerificationSessions {
        &self.sessions
    }

    /// Fails unless the local member hosts repositories and can therefore
    /// coordinate a round.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryServiceError::VerificationUnavailable`] on a member
    /// without the master or data role.
    pub fn ensure_can_verify(&self) -> RepositoryServiceResult<()> {
        if self.local.can_host_repositories() {
            return Ok(());
        }
        Err(RepositoryServiceError::VerificationUnavailable(
            self.local.id().clone(),
        ))
    }

    /// Verifies that `name` is reachable and writable from every
    /// repository-hosting member.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryServiceError::VerificationUnavailable`] when the
    /// local member does not host repositories,
    /// [`RepositoryServiceError::RepositoryNotFound`] when the
    /// repository is not live or disappears mid-round,
    /// [`RepositoryServiceError::VerificationAggregateFailure`] when any node
    /// fails or does not answer, and
    /// [`RepositoryServiceError::VerificationCleanupFailure`] when only the
    /// final cleanup fails.
    pub async fn verify(
        &self,
        name: &RepositoryName,
    ) -> RepositoryServiceResult<VerificationReport> {
        self.ensure_can_verify()?;
        let repository = self.repositories.get(name)?;
        let service = self.clone();
        tokio::spawn(async move { service.run(repository).await })
            .await
            .map_err(|err| RepositoryServiceError::Task(err.to_string()))?
    }

    async fn run(&self, repository: LiveRepository) -> RepositoryServiceResult<VerificationReport> {
        let name = repository.name().clone();
        let lifetime = repository.lifetime();

        let token = match repository.instance().start_verification().await {
            Ok(Some(token)) => token,
            Ok(None) => {
                debug!(repository = %name, "repository declined verification");
                return Ok(VerificationReport::new(name, Vec::new(), self.clock.utc()));
            }
            Err(err) => {
                let failure = VerificationFailure::new(
                    name,
                    vec![NodeFailure::new(self.local.id().clone(), err.to_string())],
                );
                return Err(RepositoryServiceError::VerificationAggregateFailure(failure));
            }
        };

        self.sessions.open(&token, &name);
        let state = self.store.state();
        let nodes: Vec<DiscoveryNode> = state
            .nodes()
            .iter()
            .filter(|node| node.can_host_repositories())
            .cloned()
            .collect();
        self.sessions
            .await_responses(&token, nodes.iter().map(DiscoveryNode::id));

        tokio::select! {
            () = lifetime.cancelled() => {
                self.sessions.finish(&token);
                debug!(
                    repository = %name,
                    "repository closed during verification; discarding session"
                );
                return Err(RepositoryServiceError::not_found(&name));
            }
            () = self.collect(&name, &token, nodes) => {}
        }

        let Some(session) = self.sessions.finish(&token) else {
            return Err(RepositoryServiceError::not_found(&name));
        };
        if repository.is_closed() {
            return Err(RepositoryServiceError::not_found(&name));
        }

        let cleanup = repository.instance().end_verification(&token).await;
        if let Err(err) = &cleanup {
            warn!(repository = %name, error = %err, "failed to finish repository verification");
        }

        match (session.failures.is_empty(), cleanup) {
            (true, Ok(())) => Ok(VerificationReport::new(
                name,
                session.responded,
                self.clock.utc(),
            )),
            (true, Err(source)) => {
                Err(RepositoryServiceError::VerificationCleanupFailure { name, source })
            }
            (false, cleanup) => {
                let mut failure = VerificationFailure::new(name, session.failures);
                if let Err(source) = cleanup {
                    failure = failure.with_cleanup_failure(source.to_string());
                }
                Err(RepositoryServiceError::VerificationAggregateFailure(failure))
            }
        }
    }

    async fn collect(
        &self,
        name: &RepositoryName,
        token: &VerificationToken,
        nodes: Vec<DiscoveryNode>,
    ) {
        let mut probes = JoinSet::new();
        let mut probed = HashMap::new();
        for node in nodes {
            let transport = Arc::clone(&self.transport);
            let request = VerifyNodeRequest::new(name.clone(), token.clone());
            let target = node.id().clone();
            let handle = probes.spawn(async move { transport.send(&node, request).await });
            probed.insert(handle.id(), target);
        }

        let gathered = tokio::time::timeout(self.timeout, async {
            while let Some(joined) = probes.join_next_with_id().await {
                let (task, outcome) = match joined {
                    Ok((id, result)) => (id, result.map_err(|err: ProbeError| err.to_string())),
                    Err(err) => (err.id(), Err(format!("verification task failed: {err}"))),
                };
                let Some(node) = probed.get(&task) else {
                    continue;
                };
                if !self.sessions.record(token, node, outcome) {
                    debug!(
                        repository = %name,
                        node = %node,
                        "discarding late verification response"
                    );
                }
            }
        })
        .await;

        if gathered.is_err() {
            warn!(repository = %name, timeout = ?self.timeout, "verification timed out");
            probes.abort_all();
        }
    }
}

/// Answers verification probes on one node.
#[derive(Debug, Clone)]
pub struct NodeVerificationHandler {
    local: DiscoveryNode,
    repositories: Arc<LiveRepositories>,
}

impl NodeVerificationHandler {
    /// Creates a handler for `local` over its live repositories.
    #[must_use]
    pub const fn new(local: DiscoveryNode, repositories: Arc<LiveRepositories>) -> Self {
        Self {
            local,
            repositories,
        }
    }

    /// Returns the node this handler answers for.
    #[must_use]
    pub const fn node(&self) -> &DiscoveryNode {
        &self.local
    }

    /// Exercises the local instance of the requested repository.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::RepositoryMissing`] when the node holds no live
    /// instance and [`ProbeError::Backend`] when the backend probe fails.
    pub async fn handle(&self, request: &VerifyNodeRequest) -> Result<(), ProbeError> {
        let repository = self
            .repositories
            .get(request.repository())
            .map_err(|_| ProbeError::RepositoryMissing(request.repository().clone()))?;
        repository
            .instance()
            .verify(request.token(), &self.local)
            .await?;
        Ok(())
    }
}
