//! Integration tests for registering and updating repositories.

use crate::test_helpers::{TestCluster, name};
use palladio::repositories::{
    domain::RepositoryDomainError,
    ports::{MetadataStore, MetadataStoreError, RepositoryBackendError},
    services::{RegisterRepositoryRequest, RepositoryServiceError},
};
use rstest::rstest;
use tempfile::TempDir;

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn register_reaches_every_member_and_verifies() {
    let cluster = TestCluster::hosting(3);

    let outcome = cluster
        .node("n1")
        .register(RegisterRepositoryRequest::new("r1", "memtype"))
        .await
        .expect("registration should succeed");

    assert!(outcome.acknowledged);
    assert!(outcome.changed);
    let report = outcome.verification.expect("verification should run");
    assert_eq!(report.verified_nodes().len(), 3);
    for node in &cluster.nodes {
        let live = node.get(&name("r1")).expect("every member holds r1");
        assert_eq!(live.descriptor().repository_type().as_str(), "memtype");
    }
    cluster.shutdown().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn identical_reregister_keeps_live_instances() {
    let cluster = TestCluster::hosting(2);
    let request = RegisterRepositoryRequest::new("r1", "memtype").with_setting("bucket", "b1");
    cluster
        .node("n1")
        .register(request.clone())
        .await
        .expect("first registration");
    let before: Vec<_> = cluster
        .nodes
        .iter()
        .map(|node| node.get(&name("r1")).expect("live r1"))
        .collect();
    let version = cluster.store.state().version();

    let outcome = cluster
        .node("n2")
        .register(request)
        .await
        .expect("repeated registration");

    assert!(outcome.acknowledged);
    assert!(!outcome.changed);
    assert_eq!(cluster.store.state().version(), version);
    for (node, previous) in cluster.nodes.iter().zip(&before) {
        let current = node.get(&name("r1")).expect("live r1");
        assert!(current.same_instance(previous));
        assert!(!previous.is_closed());
    }
    cluster.shutdown().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn changed_settings_replace_the_instance() {
    let cluster = TestCluster::hosting(2);
    cluster
        .node("n1")
        .register(RegisterRepositoryRequest::new("r1", "memory").with_setting("bucket", "b1"))
        .await
        .expect("first registration");
    let original = cluster.node("n2").get(&name("r1")).expect("live r1");

    let outcome = cluster
        .node("n1")
        .register(RegisterRepositoryRequest::new("r1", "memory").with_setting("bucket", "b2"))
        .await
        .expect("update");

    assert!(outcome.changed);
    assert!(original.is_closed());
    let replaced = cluster.node("n2").get(&name("r1")).expect("live r1");
    assert_eq!(replaced.descriptor().settings().get("bucket"), Some("b2"));
    assert_eq!(cluster.registered_names(), vec!["r1"]);
    assert_eq!(cluster.blobs.open_instances(&name("r1")).expect("open"), 2);
    cluster.shutdown().await;
}

#[rstest]
#[case("", "memory")]
#[case("_hidden", "memory")]
#[case("has space", "memory")]
#[case("r1", "")]
#[tokio::test(flavor = "multi_thread")]
async fn invalid_request_is_rejected_before_proposal(
    #[case] repository: &str,
    #[case] backend: &str,
) {
    let cluster = TestCluster::hosting(1);
    let version = cluster.store.state().version();

    let err = cluster
        .node("n1")
        .register(RegisterRepositoryRequest::new(repository, backend))
        .await
        .expect_err("invalid request");

    assert!(matches!(err, RepositoryServiceError::Domain(_)));
    assert_eq!(cluster.store.state().version(), version);
    cluster.shutdown().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unknown_type_is_rejected_before_proposal() {
    let cluster = TestCluster::hosting(1);

    let err = cluster
        .node("n1")
        .register(RegisterRepositoryRequest::new("r1", "s3"))
        .await
        .expect_err("unknown type");

    assert!(matches!(
        err,
        RepositoryServiceError::RepositoryTypeNotFound { ref repository_type, .. }
            if repository_type.as_str() == "s3"
    ));
    assert!(cluster.registered_names().is_empty());
    cluster.shutdown().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unusable_settings_fail_the_local_precheck() {
    let cluster = TestCluster::hosting(1);

    let err = cluster
        .node("n1")
        .register(RegisterRepositoryRequest::new("r1", "memory").with_setting("readonly", "maybe"))
        .await
        .expect_err("invalid boolean setting");

    assert!(matches!(
        err,
        RepositoryServiceError::RepositoryConstructionFailed { .. }
    ));
    assert!(cluster.registered_names().is_empty());
    cluster.shutdown().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn stale_proposals_are_retried() {
    let cluster = TestCluster::hosting(1);
    cluster.store.inject_stale(2);

    let outcome = cluster
        .node("n1")
        .register(RegisterRepositoryRequest::new("r1", "memory").with_verify(false))
        .await
        .expect("registration succeeds after retries");

    assert!(outcome.changed);
    assert!(outcome.verification.is_none());
    assert_eq!(cluster.registered_names(), vec!["r1"]);
    cluster.shutdown().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn persistent_staleness_gives_up() {
    let cluster = TestCluster::hosting(1);
    cluster.store.inject_stale(10);

    let err = cluster
        .node("n1")
        .register(RegisterRepositoryRequest::new("r1", "memory"))
        .await
        .expect_err("retries exhausted");

    assert!(matches!(
        err,
        RepositoryServiceError::MetadataStore(MetadataStoreError::Stale(_))
    ));
    assert!(cluster.registered_names().is_empty());
    cluster.shutdown().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn filesystem_repository_round_trip() {
    let temp = TempDir::new().expect("temp dir");
    let location = temp
        .path()
        .join("backups")
        .to_str()
        .expect("temporary path should be UTF-8")
        .to_owned();
    let cluster = TestCluster::hosting(2);

    let outcome = cluster
        .node("n2")
        .register(
            RegisterRepositoryRequest::new("backups", "fs").with_setting("location", location),
        )
        .await
        .expect("fs registration should verify");

    let report = outcome.verification.expect("verification should run");
    assert_eq!(report.verified_nodes().len(), 2);
    let leftovers: Vec<_> = std::fs::read_dir(temp.path().join("backups"))
        .expect("location exists")
        .collect();
    assert!(leftovers.is_empty(), "verification files should be removed");
    cluster.shutdown().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn blank_fs_location_is_rejected() {
    let cluster = TestCluster::hosting(1);

    let err = cluster
        .node("n1")
        .register(RegisterRepositoryRequest::new("backups", "fs").with_setting("location", " "))
        .await
        .expect_err("blank location");

    assert!(matches!(
        err,
        RepositoryServiceError::RepositoryConstructionFailed {
            source: RepositoryBackendError::InvalidSettings(
                RepositoryDomainError::InvalidSetting { .. }
            ),
            ..
        }
    ));
    cluster.shutdown().await;
}
