//! Integration tests for member roles, internal repositories and shutdown.

use crate::test_helpers::{TestCluster, coordinating, hosting, name, node_id, repository_type};
use palladio::repositories::{
    adapters::{
        InFlightOperationsUsage,
        memory::{InMemoryMetadataStore, InMemoryVerificationTransport},
    },
    ports::MetadataStore,
    services::{
        NodeCollaborators, RegisterRepositoryRequest, RegistryConfig, RepositoryFactories,
        RepositoryNode, RepositoryServiceError,
    },
};
use mockable::DefaultClock;
use rstest::rstest;
use std::sync::Arc;
use std::time::Duration;

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn coordinating_member_holds_nothing_and_is_not_awaited() {
    let cluster = TestCluster::start(vec![hosting("n1"), hosting("n2"), coordinating("c1")]);

    let outcome = cluster
        .node("n1")
        .register(RegisterRepositoryRequest::new("r1", "memory"))
        .await
        .expect("registration");

    assert!(outcome.acknowledged);
    let report = outcome.verification.expect("verification ran");
    assert_eq!(report.verified_nodes().len(), 2);
    assert!(cluster.node("c1").list().is_empty());
    assert!(cluster.node("c1").get(&name("r1")).is_err());
    assert!(cluster.node("n2").get(&name("r1")).is_ok());
    cluster.shutdown().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn coordinating_member_can_propose_but_not_verify() {
    let cluster = TestCluster::start(vec![hosting("n1"), coordinating("c1")]);

    let outcome = cluster
        .node("c1")
        .register(RegisterRepositoryRequest::new("r1", "memory").with_verify(false))
        .await
        .expect("registration through a coordinating member");
    assert!(outcome.acknowledged);
    assert!(cluster.node("n1").get(&name("r1")).is_ok());

    let err = cluster
        .node("c1")
        .verify(&name("r1"))
        .await
        .expect_err("coordinating member holds no instance");
    assert!(matches!(
        err,
        RepositoryServiceError::VerificationUnavailable(ref member) if member == &node_id("c1")
    ));
    cluster.shutdown().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn verified_registration_through_coordinating_member_is_refused_up_front() {
    let cluster = TestCluster::start(vec![hosting("n1"), hosting("n2"), coordinating("c1")]);
    let version = cluster.store.state().version();

    let err = cluster
        .node("c1")
        .register(RegisterRepositoryRequest::new("r1", "memory"))
        .await
        .expect_err("coordinating member cannot verify");

    assert!(matches!(
        err,
        RepositoryServiceError::VerificationUnavailable(ref member) if member == &node_id("c1")
    ));
    assert!(cluster.registered_names().is_empty());
    assert_eq!(cluster.store.state().version(), version);
    assert!(cluster.node("n1").get(&name("r1")).is_err());
    cluster.shutdown().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn internal_repository_stays_local() {
    let cluster = TestCluster::hosting(2);

    cluster
        .node("n1")
        .register_internal(name("system"), repository_type("memory"))
        .await
        .expect("internal registration");

    assert!(cluster.node("n1").get(&name("system")).is_ok());
    assert!(cluster.node("n2").get(&name("system")).is_err());
    assert!(cluster.node("n1").list().is_empty());
    assert!(cluster.registered_names().is_empty());

    cluster.node("n1").unregister_internal(&name("system")).await;
    assert!(cluster.node("n1").get(&name("system")).is_err());
    cluster.shutdown().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn internal_factories_are_separate_from_user_factories() {
    let cluster = TestCluster::hosting(1);

    let err = cluster
        .node("n1")
        .register_internal(name("system"), repository_type("fs"))
        .await
        .expect_err("fs is only a user type");

    assert!(matches!(
        err,
        RepositoryServiceError::RepositoryTypeNotFound { .. }
    ));
    cluster.shutdown().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn shutdown_closes_every_instance() {
    let cluster = TestCluster::hosting(2);
    cluster
        .node("n1")
        .register(RegisterRepositoryRequest::new("r1", "memory").with_verify(false))
        .await
        .expect("registration");
    cluster
        .node("n2")
        .register_internal(name("system"), repository_type("memory"))
        .await
        .expect("internal registration");

    cluster.shutdown().await;

    assert_eq!(cluster.blobs.open_instances(&name("r1")).expect("open"), 0);
    assert_eq!(cluster.blobs.open_instances(&name("system")).expect("open"), 0);
    for node in &cluster.nodes {
        assert!(node.repositories().external().is_empty());
        assert!(node.repositories().internal().is_empty());
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn zero_timeout_configuration_is_rejected() {
    let member = hosting("n1");
    let collaborators = NodeCollaborators {
        store: Arc::new(InMemoryMetadataStore::new(
            vec![member.clone()],
            Duration::from_secs(1),
        )),
        usage: Arc::new(InFlightOperationsUsage),
        transport: Arc::new(InMemoryVerificationTransport::new()),
        clock: Arc::new(DefaultClock),
    };
    let config = RegistryConfig {
        verification_timeout: Duration::ZERO,
        ..RegistryConfig::fast()
    };

    let result = RepositoryNode::start(
        member,
        RepositoryFactories::new(),
        RepositoryFactories::new(),
        config,
        collaborators,
    );

    assert!(matches!(result, Err(RepositoryServiceError::Config(_))));
}
