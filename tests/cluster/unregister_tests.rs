//! Integration tests for unregistering repositories.

use crate::test_helpers::{TestCluster, name};
use palladio::repositories::{
    domain::{InFlightOperation, OperationKind},
    ports::MetadataStore,
    services::{RegisterRepositoryRequest, RepositoryServiceError},
};
use rstest::rstest;

async fn register_all(cluster: &TestCluster, names: &[&str]) {
    for repository in names {
        cluster
            .node("n1")
            .register(RegisterRepositoryRequest::new(*repository, "memory").with_verify(false))
            .await
            .expect("registration should succeed");
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn wildcard_removes_only_matching_repositories() {
    let cluster = TestCluster::hosting(2);
    register_all(&cluster, &["a1", "a2", "b1"]).await;
    let doomed = cluster.node("n2").get(&name("a1")).expect("live a1");

    let ack = cluster
        .node("n2")
        .unregister("a*")
        .await
        .expect("wildcard unregister");

    assert!(ack.acknowledged);
    assert!(ack.changed);
    assert_eq!(cluster.registered_names(), vec!["b1"]);
    assert!(doomed.is_closed());
    for node in &cluster.nodes {
        let listed: Vec<_> = node
            .list()
            .iter()
            .map(|descriptor| descriptor.name().as_str().to_owned())
            .collect();
        assert_eq!(listed, vec!["b1"]);
    }
    cluster.shutdown().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn exact_name_removes_one_repository() {
    let cluster = TestCluster::hosting(1);
    register_all(&cluster, &["r1", "r2"]).await;

    cluster
        .node("n1")
        .unregister("r2")
        .await
        .expect("unregister r2");

    assert_eq!(cluster.registered_names(), vec!["r1"]);
    assert!(cluster.node("n1").get(&name("r2")).is_err());
    assert_eq!(cluster.blobs.open_instances(&name("r2")).expect("open"), 0);
    cluster.shutdown().await;
}

#[rstest]
#[case("missing")]
#[case("miss*")]
#[tokio::test(flavor = "multi_thread")]
async fn unmatched_pattern_is_not_found(#[case] pattern: &str) {
    let cluster = TestCluster::hosting(1);
    register_all(&cluster, &["r1"]).await;

    let err = cluster
        .node("n1")
        .unregister(pattern)
        .await
        .expect_err("nothing matches");

    assert!(matches!(
        err,
        RepositoryServiceError::RepositoryNotFound(ref missing) if missing == pattern
    ));
    assert_eq!(cluster.registered_names(), vec!["r1"]);
    cluster.shutdown().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn match_all_on_empty_registry_is_a_no_op() {
    let cluster = TestCluster::hosting(1);
    let version = cluster.store.state().version();

    let ack = cluster
        .node("n1")
        .unregister("*")
        .await
        .expect("match-all tolerates no matches");

    assert!(!ack.changed);
    assert_eq!(cluster.store.state().version(), version);
    cluster.shutdown().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn repository_in_use_cannot_be_removed_or_changed() {
    let cluster = TestCluster::hosting(2);
    register_all(&cluster, &["r1"]).await;
    cluster
        .store
        .begin_operation(InFlightOperation::new(OperationKind::Snapshot, name("r1")))
        .await
        .expect("record snapshot");
    let before = cluster.store.state().repositories().clone();

    let delete = cluster.node("n1").unregister("r*").await;
    let update = cluster
        .node("n2")
        .register(
            RegisterRepositoryRequest::new("r1", "memory")
                .with_setting("bucket", "other")
                .with_verify(false),
        )
        .await;

    assert!(matches!(delete, Err(RepositoryServiceError::RepositoryInUse(_))));
    assert!(matches!(update, Err(RepositoryServiceError::RepositoryInUse(_))));
    assert_eq!(*cluster.store.state().repositories(), before);

    cluster
        .store
        .finish_operations(name("r1"))
        .await
        .expect("finish snapshot");
    cluster
        .node("n1")
        .unregister("r1")
        .await
        .expect("unregister after snapshot finished");
    assert!(cluster.registered_names().is_empty());
    cluster.shutdown().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn name_pinned_by_an_operation_is_in_use_even_without_a_descriptor() {
    let cluster = TestCluster::hosting(1);
    cluster
        .store
        .begin_operation(InFlightOperation::new(OperationKind::Snapshot, name("ghost")))
        .await
        .expect("record snapshot");

    let err = cluster
        .node("n1")
        .unregister("ghost")
        .await
        .expect_err("ghost is pinned");

    assert!(matches!(
        err,
        RepositoryServiceError::RepositoryInUse(ref pinned) if pinned == &name("ghost")
    ));
    cluster.shutdown().await;
}
