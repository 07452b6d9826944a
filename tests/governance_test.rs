//! End-to-end governance workflow tests.
//!
//! These tests exercise the full stack through the `Governance` facade:
//!
//! - Create/approve round trip and team-filtered visibility
//! - Environment promotion, in order and with attempted stage skipping
//! - Approval ordering per (topic, environment)
//! - Self-approval enforcement
//! - Cluster sync failure and clean re-submission
//! - Concurrent submission across tasks (gap-free sequences)
//! - Snapshot recovery across restarts

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use streamgov::{
    ClusterChange, ClusterSync, Governance, GovernanceConfig, GovernanceError, InMemoryCluster,
    NewRequest, PageRequest, RequestState, Result, TopicKey, TopicState,
};

/// Cluster whose apply can be switched to fail, for failure-path tests
struct FlakyCluster {
    inner: InMemoryCluster,
    failing: AtomicBool,
}

impl FlakyCluster {
    fn new() -> Self {
        Self {
            inner: InMemoryCluster::new(),
            failing: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ClusterSync for FlakyCluster {
    async fn apply(&self, change: &ClusterChange) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(GovernanceError::SyncFailure(
                "partition reassignment in progress".to_string(),
            ));
        }
        self.inner.apply(change).await
    }

    async fn describe(&self, topic: &str, env: &str) -> Result<Option<TopicState>> {
        self.inner.describe(topic, env).await
    }
}

fn governance() -> Governance {
    Governance::in_memory(GovernanceConfig::default()).unwrap()
}

async fn create_orders(governance: &Governance) {
    let request = governance
        .submit(NewRequest::create_topic("payments", "orders", "dev").with_sizing(3, 1))
        .await
        .unwrap();
    governance.approve(&request.id, "platform").await.unwrap();
}

#[tokio::test]
async fn test_create_approve_list_round_trip() {
    let governance = governance();

    let request = governance
        .submit(NewRequest::create_topic("payments", "orders", "dev"))
        .await
        .unwrap();
    let applied = governance.approve(&request.id, "platform").await.unwrap();
    assert_eq!(applied.state, RequestState::Applied);

    let page = governance
        .list_topics("payments", Some("dev"), PageRequest::first())
        .unwrap();
    assert_eq!(page.entries.len(), 1);

    let view = &page.entries[0];
    assert_eq!(view.topic_name, "orders");
    assert_eq!(view.env, "dev");
    assert_eq!(view.pending_sequence, 0);
    assert_eq!(view.possible_teams, vec!["payments"]);
}

#[tokio::test]
async fn test_promotion_scenario() {
    let governance = governance();
    create_orders(&governance).await;

    // Team A (owner) submits the promotion; sequence 1 for (orders, test).
    let request = governance
        .submit(NewRequest::promote_topic("payments", "orders", "test"))
        .await
        .unwrap();
    assert_eq!(request.sequence, 1);

    // A non-requester team approves; the sync succeeds.
    let applied = governance.approve(&request.id, "platform").await.unwrap();
    assert_eq!(applied.state, RequestState::Applied);

    // The registry now shows orders in test.
    assert_eq!(
        governance
            .registry()
            .owner_of(&TopicKey::new("orders", "test")),
        Some("payments".to_string())
    );
    assert!(governance.verify("orders", "test").await.unwrap().is_some());
}

#[tokio::test]
async fn test_promotion_cannot_skip_stages() {
    let governance = governance();
    create_orders(&governance).await;

    // orders has never reached test, so prod is an illegal step.
    let err = governance
        .submit(NewRequest::promote_topic("payments", "orders", "prod"))
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::InvalidPromotion { .. }));
}

#[tokio::test]
async fn test_approval_ordering_per_key() {
    let governance = governance();
    create_orders(&governance).await;

    let first = governance
        .submit(NewRequest::grant_producer("checkout", "orders", "dev"))
        .await
        .unwrap();
    let second = governance
        .submit(NewRequest::grant_consumer("analytics", "orders", "dev"))
        .await
        .unwrap();

    let err = governance.approve(&second.id, "payments").await.unwrap_err();
    assert!(matches!(err, GovernanceError::OutOfOrder { .. }));

    // Rejecting the earlier request unblocks the later one.
    governance
        .reject(&first.id, "payments", "wrong team")
        .await
        .unwrap();
    governance.approve(&second.id, "payments").await.unwrap();

    let key = TopicKey::new("orders", "dev");
    assert!(!governance.registry().producers_of(&key).contains("checkout"));
    assert!(governance.registry().consumers_of(&key).contains("analytics"));
}

#[tokio::test]
async fn test_requester_never_approves_own_request() {
    let governance = governance();

    let request = governance
        .submit(NewRequest::create_topic("payments", "orders", "dev"))
        .await
        .unwrap();
    let err = governance.approve(&request.id, "payments").await.unwrap_err();
    assert!(matches!(err, GovernanceError::SelfApprovalForbidden(_)));
}

#[tokio::test]
async fn test_non_member_sees_nothing() {
    let governance = governance();
    create_orders(&governance).await;

    let page = governance
        .list_topics("billing", None, PageRequest::first())
        .unwrap();
    assert!(page.entries.is_empty());
}

#[tokio::test]
async fn test_admin_team_sees_everything() {
    let config = GovernanceConfig::default().with_admin_team("platform");
    let governance = Governance::in_memory(config).unwrap();
    create_orders(&governance).await;

    let page = governance
        .list_topics("platform", None, PageRequest::first())
        .unwrap();
    assert_eq!(page.entries.len(), 1);
}

#[tokio::test]
async fn test_sync_failure_scenario() {
    let cluster = Arc::new(FlakyCluster::new());
    let governance = Governance::new(
        GovernanceConfig::default(),
        Arc::clone(&cluster) as Arc<dyn ClusterSync>,
    )
    .unwrap();
    create_orders(&governance).await;

    cluster.failing.store(true, Ordering::SeqCst);
    let request = governance
        .submit(NewRequest::promote_topic("payments", "orders", "test"))
        .await
        .unwrap();
    let err = governance.approve(&request.id, "platform").await.unwrap_err();
    assert!(matches!(err, GovernanceError::SyncFailure(_)));
    assert_eq!(
        governance.ledger().get(&request.id).unwrap().state,
        RequestState::Failed
    );

    // The failed promotion is not visible in the target environment.
    let page = governance
        .list_topics("payments", Some("test"), PageRequest::first())
        .unwrap();
    assert!(page.entries.is_empty());

    // The prior request is terminal; the same change re-submits cleanly.
    cluster.failing.store(false, Ordering::SeqCst);
    let retry = governance
        .submit(NewRequest::promote_topic("payments", "orders", "test"))
        .await
        .unwrap();
    assert_eq!(retry.sequence, request.sequence + 1);
    governance.approve(&retry.id, "platform").await.unwrap();

    let page = governance
        .list_topics("payments", Some("test"), PageRequest::first())
        .unwrap();
    assert_eq!(page.entries.len(), 1);
}

#[tokio::test]
async fn test_concurrent_submissions_serialize_per_key() {
    let governance = Arc::new(governance());
    create_orders(&governance).await;

    // Many teams race to request consumer access on one (topic, environment).
    // Submissions for the key are serialized: exactly one becomes the open
    // request, the rest are refused as duplicates before any sequence is
    // assigned.
    let mut handles = Vec::new();
    for i in 0..20 {
        let governance = Arc::clone(&governance);
        handles.push(tokio::spawn(async move {
            governance
                .submit(NewRequest::grant_consumer(
                    format!("team-{}", i),
                    "orders",
                    "dev",
                ))
                .await
        }));
    }

    let mut winners = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(request) => winners.push(request),
            Err(err) => assert!(matches!(err, GovernanceError::DuplicatePending { .. })),
        }
    }

    // One winner, and the refused submissions left no sequence gaps: the
    // create took 1, the winning grant took 2, the next submission takes 3.
    assert_eq!(winners.len(), 1);
    assert_eq!(winners[0].sequence, 2);

    governance
        .approve(&winners[0].id, "payments")
        .await
        .unwrap();
    let next = governance
        .submit(NewRequest::grant_producer("team-20", "orders", "dev"))
        .await
        .unwrap();
    assert_eq!(next.sequence, 3);
}

#[tokio::test]
async fn test_delete_removes_from_live_set_but_keeps_request() {
    let governance = governance();
    create_orders(&governance).await;

    let request = governance
        .submit(NewRequest::delete_topic("payments", "orders", "dev"))
        .await
        .unwrap();
    governance.approve(&request.id, "platform").await.unwrap();

    let page = governance
        .list_topics("payments", None, PageRequest::first())
        .unwrap();
    assert!(page.entries.is_empty());

    // The ledger keeps the full history as an audit record.
    assert_eq!(governance.requests_for_team("payments").len(), 2);
}

#[tokio::test]
async fn test_cancellation_is_requester_rejection() {
    let governance = governance();

    let request = governance
        .submit(NewRequest::create_topic("payments", "orders", "dev"))
        .await
        .unwrap();

    let err = governance.cancel(&request.id, "checkout").await.unwrap_err();
    assert!(matches!(err, GovernanceError::Unauthorized { .. }));

    let cancelled = governance.cancel(&request.id, "payments").await.unwrap();
    assert_eq!(cancelled.state, RequestState::Rejected);

    // Once resolved, cancellation is no longer possible.
    let err = governance.cancel(&request.id, "payments").await.unwrap_err();
    assert!(matches!(err, GovernanceError::NotPending { .. }));
}

#[tokio::test]
async fn test_restart_preserves_workflow_state() {
    let dir = tempfile::tempdir().unwrap();
    let config = GovernanceConfig::default().with_data_dir(dir.path());

    let pending_id = {
        let governance = Governance::in_memory(config.clone()).unwrap();
        create_orders(&governance).await;
        governance
            .submit(NewRequest::grant_producer("checkout", "orders", "dev"))
            .await
            .unwrap()
            .id
    };

    let governance = Governance::in_memory(config).unwrap();
    governance.approve(&pending_id, "payments").await.unwrap();

    let key = TopicKey::new("orders", "dev");
    assert!(governance.registry().producers_of(&key).contains("checkout"));
}
