//! Integration tests for cluster-wide verification.

use crate::test_helpers::{TestCluster, name, node_id};
use palladio::repositories::{
    domain::VerificationPhase,
    services::{RegisterRepositoryRequest, RepositoryServiceError},
};
use rstest::rstest;
use std::time::Duration;

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_verification_keeps_the_registration() {
    let cluster = TestCluster::hosting(3);
    cluster
        .blobs
        .deny_node(node_id("n3"), "mount missing")
        .expect("deny n3");

    let err = cluster
        .node("n1")
        .register(RegisterRepositoryRequest::new("r1", "memory"))
        .await
        .expect_err("n3 cannot verify");

    let failure = match err {
        RepositoryServiceError::VerificationAggregateFailure(failure) => failure,
        other => panic!("expected aggregate failure, got {other:?}"),
    };
    assert_eq!(failure.failed_nodes(), vec![&node_id("n3")]);
    assert!(failure.to_string().contains("mount missing"));
    assert_eq!(cluster.registered_names(), vec!["r1"]);
    assert!(cluster.node("n3").get(&name("r1")).is_ok());
    cluster.shutdown().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn disconnected_member_fails_verification() {
    let cluster = TestCluster::hosting(3);
    cluster
        .node("n1")
        .register(RegisterRepositoryRequest::new("r1", "memory").with_verify(false))
        .await
        .expect("registration");
    cluster
        .transport
        .disconnect(&node_id("n2"))
        .expect("disconnect n2");

    let err = cluster
        .node("n1")
        .verify(&name("r1"))
        .await
        .expect_err("n2 unreachable");

    let failure = match err {
        RepositoryServiceError::VerificationAggregateFailure(failure) => failure,
        other => panic!("expected aggregate failure, got {other:?}"),
    };
    assert_eq!(failure.failed_nodes(), vec![&node_id("n2")]);
    assert_eq!(
        cluster.node("n1").verification_sessions().phase(&name("r1")),
        VerificationPhase::Idle
    );
    cluster.shutdown().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn verification_can_be_skipped() {
    let cluster = TestCluster::hosting(2);

    let outcome = cluster
        .node("n1")
        .register(RegisterRepositoryRequest::new("r1", "memory").with_verify(false))
        .await
        .expect("registration");

    assert!(outcome.verification.is_none());
    assert_eq!(
        cluster.blobs.counters().expect("counters").verifications_started,
        0
    );
    cluster.shutdown().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn readonly_repository_declines_verification() {
    let cluster = TestCluster::hosting(2);

    let outcome = cluster
        .node("n2")
        .register(
            RegisterRepositoryRequest::new("archive", "memory").with_setting("readonly", "true"),
        )
        .await
        .expect("registration");

    let report = outcome.verification.expect("verification ran");
    assert!(report.verified_nodes().is_empty());
    assert_eq!(cluster.blobs.counters().expect("counters").probes, 0);
    cluster.shutdown().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unregister_during_verification_reports_not_found() {
    let cluster = TestCluster::hosting(2);
    cluster
        .node("n1")
        .register(RegisterRepositoryRequest::new("r1", "memory").with_verify(false))
        .await
        .expect("registration");
    cluster
        .transport
        .delay(&node_id("n2"), Duration::from_secs(5))
        .expect("delay n2");

    let r1 = name("r1");
    let (verified, unregistered) = tokio::join!(cluster.node("n1").verify(&r1), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cluster.node("n2").unregister("r1").await
    });

    unregistered.expect("unregister should succeed");
    assert!(matches!(
        verified,
        Err(RepositoryServiceError::RepositoryNotFound(_))
    ));
    assert_eq!(
        cluster.blobs.counters().expect("counters").verifications_ended,
        0
    );
    cluster.shutdown().await;
}
