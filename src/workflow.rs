//! Approval workflow engine
//!
//! Drives change requests through their lifecycle:
//! `pending -> {approved, rejected}`, `approved -> {applied, failed}`.
//! Submission and approval for one (topic, environment) are serialized by a
//! keyed lock; operations on different keys proceed in parallel.
//!
//! # Lock Discipline
//!
//! One `tokio::sync::Mutex` per (topic, environment) key, acquired for the
//! whole of `submit`, `approve`, and `reject`. The lock IS held across the
//! `ClusterSync::apply` call: requests for the same key queue behind an
//! in-flight sync and can never observe a half-applied registry. Visibility
//! reads take no keyed lock.

use crate::audit::{AuditLog, GovernanceEvent};
use crate::environment::{EnvironmentGraph, PromotionStep};
use crate::error::{GovernanceError, Result};
use crate::ledger::{Request, RequestKind, RequestLedger, RequestState};
use crate::sync::{ClusterChange, ClusterSync, TopicState};
use crate::team::{TeamRegistry, TopicKey, TopicRecord};
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// A change request as submitted by a caller
#[derive(Debug, Clone)]
pub struct NewRequest {
    /// Team submitting the request
    pub requester_team: String,
    /// Topic the change targets
    pub topic: String,
    /// Environment the change targets
    pub env: String,
    /// Kind of change
    pub kind: RequestKind,
    /// Partition count for create kinds (None = configured default)
    pub partitions: Option<i32>,
    /// Replication factor for create kinds (None = configured default)
    pub replication_factor: Option<i16>,
}

impl NewRequest {
    fn new(team: impl Into<String>, topic: impl Into<String>, env: impl Into<String>, kind: RequestKind) -> Self {
        Self {
            requester_team: team.into(),
            topic: topic.into(),
            env: env.into(),
            kind,
            partitions: None,
            replication_factor: None,
        }
    }

    /// Request creation of a topic
    pub fn create_topic(
        team: impl Into<String>,
        topic: impl Into<String>,
        env: impl Into<String>,
    ) -> Self {
        Self::new(team, topic, env, RequestKind::CreateTopic)
    }

    /// Request promotion of a topic to `env`
    pub fn promote_topic(
        team: impl Into<String>,
        topic: impl Into<String>,
        env: impl Into<String>,
    ) -> Self {
        Self::new(team, topic, env, RequestKind::PromoteTopic)
    }

    /// Request producer rights for the team
    pub fn grant_producer(
        team: impl Into<String>,
        topic: impl Into<String>,
        env: impl Into<String>,
    ) -> Self {
        Self::new(team, topic, env, RequestKind::GrantProducer)
    }

    /// Request consumer rights for the team
    pub fn grant_consumer(
        team: impl Into<String>,
        topic: impl Into<String>,
        env: impl Into<String>,
    ) -> Self {
        Self::new(team, topic, env, RequestKind::GrantConsumer)
    }

    /// Request removal of a topic from an environment
    pub fn delete_topic(
        team: impl Into<String>,
        topic: impl Into<String>,
        env: impl Into<String>,
    ) -> Self {
        Self::new(team, topic, env, RequestKind::DeleteTopic)
    }

    /// Set topic sizing for create kinds
    pub fn with_sizing(mut self, partitions: i32, replication_factor: i16) -> Self {
        self.partitions = Some(partitions);
        self.replication_factor = Some(replication_factor);
        self
    }
}

/// File locations for ledger and registry snapshots
#[derive(Debug, Clone)]
pub struct SnapshotPaths {
    /// Request ledger snapshot
    pub ledger: PathBuf,
    /// Team registry snapshot
    pub registry: PathBuf,
}

impl SnapshotPaths {
    /// Conventional snapshot layout inside a data directory
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            ledger: dir.join("ledger.yaml"),
            registry: dir.join("registry.yaml"),
        }
    }
}

/// Drives requests through their lifecycle, enforcing authorization,
/// promotion order, and per-key approval ordering
pub struct ApprovalEngine {
    registry: Arc<TeamRegistry>,
    ledger: Arc<RequestLedger>,
    environments: Arc<EnvironmentGraph>,
    cluster: Arc<dyn ClusterSync>,
    audit: Arc<AuditLog>,
    /// Per-(topic, environment) mutual exclusion
    key_locks: DashMap<TopicKey, Arc<Mutex<()>>>,
    /// Snapshot persistence (None = in-memory only)
    snapshots: Option<SnapshotPaths>,
    default_partitions: i32,
    default_replication_factor: i16,
}

impl ApprovalEngine {
    /// Create an engine over the given collaborators
    pub fn new(
        registry: Arc<TeamRegistry>,
        ledger: Arc<RequestLedger>,
        environments: Arc<EnvironmentGraph>,
        cluster: Arc<dyn ClusterSync>,
    ) -> Self {
        Self {
            registry,
            ledger,
            environments,
            cluster,
            audit: Arc::new(AuditLog::in_memory()),
            key_locks: DashMap::new(),
            snapshots: None,
            default_partitions: 1,
            default_replication_factor: 1,
        }
    }

    /// Use the given audit log
    pub fn with_audit(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = audit;
        self
    }

    /// Persist ledger and registry snapshots at the given paths
    pub fn with_snapshots(mut self, snapshots: SnapshotPaths) -> Self {
        self.snapshots = Some(snapshots);
        self
    }

    /// Topic sizing applied when a create request does not specify one
    pub fn with_topic_defaults(mut self, partitions: i32, replication_factor: i16) -> Self {
        self.default_partitions = partitions;
        self.default_replication_factor = replication_factor;
        self
    }

    /// Submit a change request.
    ///
    /// Validates team authorization and environment placement, refuses a
    /// duplicate of an open request, assigns the next sequence for the
    /// (topic, environment), and stores the request as `pending`. All
    /// validation happens before any mutation.
    pub async fn submit(&self, new_request: NewRequest) -> Result<Request> {
        let NewRequest {
            requester_team,
            topic,
            env,
            kind,
            partitions,
            replication_factor,
        } = new_request;

        if !self.environments.contains(&env) {
            return Err(GovernanceError::UnknownEnvironment(env));
        }

        let key = TopicKey::new(topic.clone(), env.clone());
        let lock = self.key_lock(&key);
        let _guard = lock.lock().await;

        self.registry.authorize(&requester_team, &topic, &env, kind)?;
        self.validate_placement(&topic, &env, kind)?;

        if self.ledger.has_open(&key, kind) {
            return Err(GovernanceError::DuplicatePending {
                topic,
                env,
                kind: kind.to_string(),
            });
        }

        let sequence = self.ledger.next_sequence(&key);
        let mut request = Request::new(topic, env, kind, requester_team, sequence);
        if kind == RequestKind::CreateTopic {
            request = request.with_sizing(
                partitions.unwrap_or(self.default_partitions),
                replication_factor.unwrap_or(self.default_replication_factor),
            );
        }

        self.ledger.insert(request.clone());
        if let Err(e) = self.persist_ledger() {
            // The submission never became durable; release its sequence so
            // the per-key numbering stays gap-free.
            self.ledger.unwind_insert(&request);
            return Err(e);
        }

        self.audit.record(GovernanceEvent::RequestSubmitted {
            request_id: request.id.clone(),
            team: request.requester_team.clone(),
            topic: request.topic.clone(),
            env: request.env.clone(),
            kind: kind.to_string(),
            sequence,
        });
        info!(
            request_id = %request.id,
            topic = %key,
            kind = %kind,
            sequence,
            "Change request submitted"
        );
        Ok(request)
    }

    /// Approve a pending request and apply it to the cluster.
    ///
    /// The requester team may never approve its own request, and requests
    /// for one (topic, environment) must be approved in sequence order. On
    /// sync success the registry mutation and the `applied` transition
    /// commit together; on sync failure the request is `failed` and the
    /// registry is left untouched.
    pub async fn approve(&self, request_id: &str, approver_team: &str) -> Result<Request> {
        let request = self
            .ledger
            .get(request_id)
            .ok_or_else(|| GovernanceError::RequestNotFound(request_id.to_string()))?;
        let key = request.key();
        let lock = self.key_lock(&key);
        let _guard = lock.lock().await;

        // Re-read under the key lock; a concurrent resolution may have won.
        let request = self
            .ledger
            .get(request_id)
            .ok_or_else(|| GovernanceError::RequestNotFound(request_id.to_string()))?;

        if request.state != RequestState::Pending {
            return Err(GovernanceError::NotPending {
                id: request.id,
                state: request.state.to_string(),
            });
        }
        if request.requester_team == approver_team {
            return Err(GovernanceError::SelfApprovalForbidden(
                request.requester_team,
            ));
        }
        if let Some(earliest) = self.ledger.min_pending_sequence(&key) {
            if earliest < request.sequence {
                return Err(GovernanceError::OutOfOrder {
                    topic: request.topic,
                    env: request.env,
                    requested: request.sequence,
                    earliest,
                });
            }
        }

        let change = self.change_for(&request)?;
        let request = self
            .ledger
            .update(request_id, |r| r.approve(approver_team))?;
        self.audit.record(GovernanceEvent::RequestApproved {
            request_id: request.id.clone(),
            approver_team: approver_team.to_string(),
            topic: request.topic.clone(),
            env: request.env.clone(),
        });
        info!(
            request_id = %request.id,
            approver_team = %approver_team,
            change = %change,
            "Request approved, syncing to cluster"
        );

        match self.cluster.apply(&change).await {
            Ok(()) => {
                if let Err(e) = self.apply_to_registry(&request) {
                    return self.fail_request(&request, format!("registry update failed: {}", e));
                }
                let request = self.ledger.update(request_id, |r| r.apply())?;
                self.persist_ledger()?;
                self.persist_registry()?;

                self.audit.record(GovernanceEvent::ChangeApplied {
                    request_id: request.id.clone(),
                    topic: request.topic.clone(),
                    env: request.env.clone(),
                    kind: request.kind.to_string(),
                });
                info!(request_id = %request.id, change = %change, "Change applied");
                Ok(request)
            }
            Err(e) => self.fail_request(&request, e.to_string()),
        }
    }

    /// Reject a pending request. No cluster interaction.
    pub async fn reject(
        &self,
        request_id: &str,
        approver_team: &str,
        reason: impl Into<String>,
    ) -> Result<Request> {
        let reason = reason.into();
        let request = self
            .ledger
            .get(request_id)
            .ok_or_else(|| GovernanceError::RequestNotFound(request_id.to_string()))?;
        let key = request.key();
        let lock = self.key_lock(&key);
        let _guard = lock.lock().await;

        let request = self
            .ledger
            .get(request_id)
            .ok_or_else(|| GovernanceError::RequestNotFound(request_id.to_string()))?;
        if request.state != RequestState::Pending {
            return Err(GovernanceError::NotPending {
                id: request.id,
                state: request.state.to_string(),
            });
        }

        let updated = self
            .ledger
            .update(request_id, |r| r.reject(approver_team, reason.clone()))?;
        if let Err(e) = self.persist_ledger() {
            // The rejection never became durable; restore the pending state.
            self.ledger.update(request_id, |r| {
                r.state = RequestState::Pending;
                r.approver_team = None;
                r.reject_reason = None;
                r.resolved_at_ms = None;
            })?;
            return Err(e);
        }

        self.audit.record(GovernanceEvent::RequestRejected {
            request_id: updated.id.clone(),
            approver_team: approver_team.to_string(),
            topic: updated.topic.clone(),
            env: updated.env.clone(),
            reason,
        });
        info!(request_id = %updated.id, approver_team = %approver_team, "Request rejected");
        Ok(updated)
    }

    /// Cancel a pending request: a rejection by the requester team itself.
    pub async fn cancel(&self, request_id: &str, caller_team: &str) -> Result<Request> {
        let request = self
            .ledger
            .get(request_id)
            .ok_or_else(|| GovernanceError::RequestNotFound(request_id.to_string()))?;
        if request.requester_team != caller_team {
            return Err(GovernanceError::unauthorized(
                caller_team,
                format!(
                    "cancel a request submitted by team '{}'",
                    request.requester_team
                ),
            ));
        }
        self.reject(request_id, caller_team, "cancelled by requester").await
    }

    /// Describe the live cluster state of a topic
    pub async fn verify(&self, topic: &str, env: &str) -> Result<Option<TopicState>> {
        self.cluster.describe(topic, env).await
    }

    /// Mark a request failed, persist, and surface the sync failure
    fn fail_request(&self, request: &Request, detail: String) -> Result<Request> {
        let failed = self.ledger.update(&request.id, |r| r.fail(detail.clone()))?;
        if let Err(e) = self.persist_ledger() {
            warn!(request_id = %request.id, error = %e, "Failed to persist ledger after sync failure");
        }
        self.audit.record(GovernanceEvent::SyncFailed {
            request_id: failed.id.clone(),
            topic: failed.topic.clone(),
            env: failed.env.clone(),
            detail: detail.clone(),
        });
        warn!(request_id = %failed.id, error = %detail, "Cluster sync failed; request marked failed");
        Err(GovernanceError::SyncFailure(detail))
    }

    /// Environment placement rules beyond team authorization
    fn validate_placement(&self, topic: &str, env: &str, kind: RequestKind) -> Result<()> {
        match kind {
            RequestKind::CreateTopic => {
                let base = self.environments.base();
                if env != base {
                    return Err(GovernanceError::invalid_promotion(
                        topic,
                        format!(
                            "new topics are created in '{}'; use promotion to reach '{}'",
                            base, env
                        ),
                    ));
                }
                Ok(())
            }
            RequestKind::PromoteTopic => {
                let current = self
                    .highest_env(topic)
                    .ok_or_else(|| GovernanceError::TopicNotFound {
                        topic: topic.to_string(),
                        env: env.to_string(),
                    })?;

                match self.environments.next_after(&current)? {
                    PromotionStep::Complete => Err(GovernanceError::invalid_promotion(
                        topic,
                        format!("already promoted through '{}', the final environment", current),
                    )),
                    PromotionStep::Next(next) if next != env => {
                        Err(GovernanceError::invalid_promotion(
                            topic,
                            format!("next environment after '{}' is '{}', not '{}'", current, next, env),
                        ))
                    }
                    PromotionStep::Next(_) => Ok(()),
                }
            }
            RequestKind::GrantProducer
            | RequestKind::GrantConsumer
            | RequestKind::DeleteTopic => Ok(()),
        }
    }

    /// The highest-ranked environment a topic currently lives in
    fn highest_env(&self, topic: &str) -> Option<String> {
        self.registry
            .environments_of(topic)
            .into_iter()
            .filter_map(|env| self.environments.rank(&env).map(|rank| (rank, env)))
            .max_by_key(|(rank, _)| *rank)
            .map(|(_, env)| env)
    }

    /// The record promotion copies from: the topic's highest environment
    fn source_record(&self, topic: &str) -> Option<TopicRecord> {
        let env = self.highest_env(topic)?;
        self.registry.get(&TopicKey::new(topic, env))
    }

    /// Build the cluster change an approved request translates to
    fn change_for(&self, request: &Request) -> Result<ClusterChange> {
        match request.kind {
            RequestKind::CreateTopic => Ok(ClusterChange::CreateTopic {
                name: request.topic.clone(),
                env: request.env.clone(),
                partitions: request.partitions.unwrap_or(self.default_partitions),
                replication_factor: request
                    .replication_factor
                    .unwrap_or(self.default_replication_factor),
            }),
            RequestKind::PromoteTopic => {
                let source = self.source_record(&request.topic).ok_or_else(|| {
                    GovernanceError::TopicNotFound {
                        topic: request.topic.clone(),
                        env: request.env.clone(),
                    }
                })?;
                Ok(ClusterChange::CreateTopic {
                    name: request.topic.clone(),
                    env: request.env.clone(),
                    partitions: source.partitions,
                    replication_factor: source.replication_factor,
                })
            }
            RequestKind::GrantProducer => Ok(ClusterChange::AddProducerAcl {
                topic: request.topic.clone(),
                env: request.env.clone(),
                team: request.requester_team.clone(),
            }),
            RequestKind::GrantConsumer => Ok(ClusterChange::AddConsumerAcl {
                topic: request.topic.clone(),
                env: request.env.clone(),
                team: request.requester_team.clone(),
            }),
            RequestKind::DeleteTopic => Ok(ClusterChange::DeleteTopic {
                name: request.topic.clone(),
                env: request.env.clone(),
            }),
        }
    }

    /// Commit an applied change to the team registry
    fn apply_to_registry(&self, request: &Request) -> Result<()> {
        let key = request.key();
        match request.kind {
            RequestKind::CreateTopic => {
                self.registry.insert_topic(TopicRecord::new(
                    request.topic.clone(),
                    request.env.clone(),
                    request.requester_team.clone(),
                    request.partitions.unwrap_or(self.default_partitions),
                    request
                        .replication_factor
                        .unwrap_or(self.default_replication_factor),
                ));
                Ok(())
            }
            RequestKind::PromoteTopic => {
                let source = self.source_record(&request.topic).ok_or_else(|| {
                    GovernanceError::TopicNotFound {
                        topic: request.topic.clone(),
                        env: request.env.clone(),
                    }
                })?;
                // Grants are per-environment: the promoted record carries
                // owner and sizing, not the source's producer/consumer sets.
                self.registry.insert_topic(TopicRecord::new(
                    request.topic.clone(),
                    request.env.clone(),
                    source.owner_team,
                    source.partitions,
                    source.replication_factor,
                ));
                Ok(())
            }
            RequestKind::GrantProducer => self.registry.add_producer(&key, &request.requester_team),
            RequestKind::GrantConsumer => self.registry.add_consumer(&key, &request.requester_team),
            RequestKind::DeleteTopic => self.registry.remove_topic(&key),
        }
    }

    fn key_lock(&self, key: &TopicKey) -> Arc<Mutex<()>> {
        self.key_locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn persist_ledger(&self) -> Result<()> {
        if let Some(paths) = &self.snapshots {
            self.ledger.save_to_file(&paths.ledger)?;
        }
        Ok(())
    }

    fn persist_registry(&self) -> Result<()> {
        if let Some(paths) = &self.snapshots {
            self.registry.save_to_file(&paths.registry)?;
        }
        Ok(())
    }
}
