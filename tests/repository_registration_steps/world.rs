//! Shared world state for repository registration BDD scenarios.

use crate::test_helpers::{TestCluster, TestNode};
use eyre::eyre;
use palladio::repositories::{
    ports::ProposalAck,
    services::{LiveRepository, RegisterOutcome, RepositoryServiceError},
};
use rstest::fixture;

/// Scenario world for repository registration behaviour tests.
#[derive(Default)]
pub struct RegistrationWorld {
    /// Cluster under test, started by a `Given` step.
    pub cluster: Option<TestCluster>,
    /// Live instances captured before the step under test.
    pub original_instances: Vec<LiveRepository>,
    /// Result of the last registration request.
    pub last_register_result: Option<Result<RegisterOutcome, RepositoryServiceError>>,
    /// Result of the last unregister request.
    pub last_unregister_result: Option<Result<ProposalAck, RepositoryServiceError>>,
}

impl RegistrationWorld {
    /// Returns the running cluster.
    ///
    /// # Errors
    ///
    /// Returns an error when no cluster was started.
    pub fn cluster(&self) -> Result<&TestCluster, eyre::Report> {
        self.cluster
            .as_ref()
            .ok_or_else(|| eyre!("no cluster in scenario world"))
    }

    /// Returns the member named `id`.
    ///
    /// # Errors
    ///
    /// Returns an error when no cluster was started or the member is unknown.
    pub fn member(&self, id: &str) -> Result<&TestNode, eyre::Report> {
        self.cluster()?
            .nodes
            .iter()
            .find(|node| node.local().id().as_str() == id)
            .ok_or_else(|| eyre!("no member named {id}"))
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> RegistrationWorld {
    RegistrationWorld::default()
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}
