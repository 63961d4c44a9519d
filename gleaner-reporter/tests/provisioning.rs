//! One-shot create-or-reconcile protocol against a stateful mock admin.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{InjectedAdminError, MockAdmin};
use gleaner_reporter::{TopicProvisioner, TopicSpec};

const CREATE_TIMEOUT: Duration = Duration::from_secs(1);

fn spec(partitions: i32, retention_ms: u64) -> TopicSpec {
    TopicSpec::new("__gleaner_metrics", partitions, 1, retention_ms, 0).expect("valid spec")
}

/// Topic absent: create succeeds on the first attempt and the reconcile path
/// is never entered.
#[tokio::test]
async fn creates_topic_when_absent() {
    common::init_tracing();
    let admin = MockAdmin::without_topic();
    let provisioner = TopicProvisioner::new(admin.clone(), spec(4, 1_000), CREATE_TIMEOUT, 3);

    provisioner.provision().await;

    assert_eq!(admin.create_calls.load(Ordering::SeqCst), 1);
    assert_eq!(admin.alter_calls.load(Ordering::SeqCst), 0);
    assert_eq!(admin.partitions(), 4);
    assert_eq!(
        admin.live_config().get("cleanup.policy").map(String::as_str),
        Some("delete")
    );
}

/// Purpose
/// - Validate create(spec) idempotence: provisioning twice against the same
///   already-provisioned topic converges to the declared retention/cleanup
///   policy and the second invocation issues zero additional alter-config
///   calls.
#[tokio::test]
async fn second_provisioning_run_issues_no_additional_writes() {
    common::init_tracing();
    let admin = MockAdmin::with_topic(
        4,
        &[("retention.ms", "1000"), ("cleanup.policy", "compact")],
    );

    let provisioner = TopicProvisioner::new(admin.clone(), spec(4, 500_000), CREATE_TIMEOUT, 3);
    provisioner.provision().await;

    assert_eq!(admin.alter_calls.load(Ordering::SeqCst), 1);
    let live = admin.live_config();
    assert_eq!(live.get("retention.ms").map(String::as_str), Some("500000"));
    assert_eq!(live.get("cleanup.policy").map(String::as_str), Some("delete"));

    // Second run: live state already matches, so no further admin writes.
    let provisioner = TopicProvisioner::new(admin.clone(), spec(4, 500_000), CREATE_TIMEOUT, 3);
    provisioner.provision().await;

    assert_eq!(admin.alter_calls.load(Ordering::SeqCst), 1);
    assert_eq!(admin.partition_calls.load(Ordering::SeqCst), 0);
}

/// Live config equal to desired config issues no alter-config call at all.
#[tokio::test]
async fn matching_config_issues_no_alter_call() {
    common::init_tracing();
    let admin = MockAdmin::with_topic(
        2,
        &[("retention.ms", "500000"), ("cleanup.policy", "delete")],
    );
    let provisioner = TopicProvisioner::new(admin.clone(), spec(2, 500_000), CREATE_TIMEOUT, 3);

    provisioner.provision().await;

    assert_eq!(admin.alter_calls.load(Ordering::SeqCst), 0);
}

/// A diff in only one of the two managed keys alters just that key and
/// leaves unmanaged live entries untouched.
#[tokio::test]
async fn alter_covers_only_the_differing_managed_keys() {
    common::init_tracing();
    let admin = MockAdmin::with_topic(
        2,
        &[
            ("retention.ms", "500000"),
            ("cleanup.policy", "compact"),
            ("segment.bytes", "1073741824"),
        ],
    );
    let provisioner = TopicProvisioner::new(admin.clone(), spec(2, 500_000), CREATE_TIMEOUT, 3);

    provisioner.provision().await;

    assert_eq!(admin.alter_calls.load(Ordering::SeqCst), 1);
    let live = admin.live_config();
    assert_eq!(live.get("cleanup.policy").map(String::as_str), Some("delete"));
    // Unmanaged key untouched
    assert_eq!(
        live.get("segment.bytes").map(String::as_str),
        Some("1073741824")
    );
}

/// Live partition count below the spec is raised to exactly the desired
/// count.
#[tokio::test]
async fn partition_count_is_raised_to_desired() {
    common::init_tracing();
    let admin = MockAdmin::with_topic(
        2,
        &[("retention.ms", "500000"), ("cleanup.policy", "delete")],
    );
    let provisioner = TopicProvisioner::new(admin.clone(), spec(5, 500_000), CREATE_TIMEOUT, 3);

    provisioner.provision().await;

    assert_eq!(admin.partition_calls.load(Ordering::SeqCst), 1);
    assert_eq!(admin.partitions(), 5);
}

/// Desired below live is a no-op, never a decrease and never an error.
#[tokio::test]
async fn partition_count_is_never_decreased() {
    common::init_tracing();
    let admin = MockAdmin::with_topic(
        8,
        &[("retention.ms", "500000"), ("cleanup.policy", "delete")],
    );
    let provisioner = TopicProvisioner::new(admin.clone(), spec(2, 500_000), CREATE_TIMEOUT, 3);

    provisioner.provision().await;

    assert_eq!(admin.partition_calls.load(Ordering::SeqCst), 0);
    assert_eq!(admin.partitions(), 8);
}

/// An ongoing reassignment makes the partition increase a logged skip, not a
/// failure.
#[tokio::test]
async fn reassignment_in_progress_skips_partition_increase() {
    common::init_tracing();
    let admin = MockAdmin::with_topic(
        2,
        &[("retention.ms", "500000"), ("cleanup.policy", "delete")],
    );
    *admin.partition_error.lock().expect("partition error") =
        Some(InjectedAdminError::ReassignmentInProgress);
    let provisioner = TopicProvisioner::new(admin.clone(), spec(5, 500_000), CREATE_TIMEOUT, 3);

    provisioner.provision().await;

    assert_eq!(admin.partition_calls.load(Ordering::SeqCst), 1);
    assert_eq!(admin.partitions(), 2);
}

/// Every create attempt timing out exhausts exactly the configured retry
/// budget, then provisioning is abandoned without touching reconcile.
#[tokio::test]
async fn create_retry_exhaustion_abandons_provisioning() {
    common::init_tracing();
    let admin = MockAdmin::without_topic();
    *admin.create_error.lock().expect("create error") = Some(InjectedAdminError::Timeout);
    let provisioner = TopicProvisioner::new(admin.clone(), spec(2, 500_000), CREATE_TIMEOUT, 3);

    provisioner.provision().await;

    assert_eq!(admin.create_calls.load(Ordering::SeqCst), 3);
    assert_eq!(admin.alter_calls.load(Ordering::SeqCst), 0);
    assert_eq!(admin.partition_calls.load(Ordering::SeqCst), 0);
}
