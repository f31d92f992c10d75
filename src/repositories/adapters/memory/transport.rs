//! In-process probe transport routing requests to node handlers.

use crate::repositories::{
    domain::{DiscoveryNode, NodeId},
    ports::{ProbeError, VerificationTransport, VerifyNodeRequest},
    services::NodeVerificationHandler,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::time::Duration;

/// Transport delivering probes by direct call to each member's handler.
///
/// Members can be disconnected or slowed down to exercise partial failures
/// and timeouts.
#[derive(Debug, Default)]
pub struct InMemoryVerificationTransport {
    routes: RwLock<Routes>,
}

#[derive(Debug, Default)]
struct Routes {
    handlers: HashMap<NodeId, NodeVerificationHandler>,
    disconnected: HashSet<NodeId>,
    delays: HashMap<NodeId, Duration>,
}

impl InMemoryVerificationTransport {
    /// Creates a transport with no routes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn edit(&self, apply: impl FnOnce(&mut Routes)) -> Result<(), ProbeError> {
        let mut routes = self
            .routes
            .write()
            .map_err(|err| ProbeError::Transport(err.to_string()))?;
        apply(&mut routes);
        Ok(())
    }

    /// Routes probes addressed to the handler's node to `handler`.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Transport`] when lock acquisition fails.
    pub fn connect(&self, handler: NodeVerificationHandler) -> Result<(), ProbeError> {
        self.edit(|routes| {
            let node = handler.node().id().clone();
            routes.disconnected.remove(&node);
            routes.handlers.insert(node, handler);
        })
    }

    /// Makes probes to `node` fail as disconnected.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Transport`] when lock acquisition fails.
    pub fn disconnect(&self, node: &NodeId) -> Result<(), ProbeError> {
        self.edit(|routes| {
            routes.disconnected.insert(node.clone());
        })
    }

    /// Delays every probe to `node` by `delay`.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Transport`] when lock acquisition fails.
    pub fn delay(&self, node: &NodeId, delay: Duration) -> Result<(), ProbeError> {
        self.edit(|routes| {
            routes.delays.insert(node.clone(), delay);
        })
    }
}

#[async_trait]
impl VerificationTransport for InMemoryVerificationTransport {
    async fn send(
        &self,
        node: &DiscoveryNode,
        request: VerifyNodeRequest,
    ) -> Result<(), ProbeError> {
        let (handler, delay) = {
            let routes = self
                .routes
                .read()
                .map_err(|err| ProbeError::Transport(err.to_string()))?;
            if routes.disconnected.contains(node.id()) {
                return Err(ProbeError::Disconnected);
            }
            let handler = routes.handlers.get(node.id()).cloned().ok_or_else(|| {
                ProbeError::Transport(format!("no route to node [{}]", node.id()))
            })?;
            (handler, routes.delays.get(node.id()).copied())
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        handler.handle(&request).await
    }
}
