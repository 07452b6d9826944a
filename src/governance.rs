//! Embedded governance facade
//!
//! Wires the governance components together from a single configuration
//! value: environment graph, team registry, request ledger, audit log,
//! approval engine, and visibility service. With a data directory
//! configured, ledger and registry snapshots are loaded on startup and
//! written after every committed transition, and the audit trail appends to
//! a JSONL file.

use crate::audit::{AuditLog, AuditRecord};
use crate::config::GovernanceConfig;
use crate::environment::EnvironmentGraph;
use crate::error::{GovernanceError, Result};
use crate::ledger::{Request, RequestLedger};
use crate::sync::{ClusterSync, InMemoryCluster, TopicState};
use crate::team::TeamRegistry;
use crate::visibility::{PageRequest, VisibilityPage, VisibilityService};
use crate::workflow::{ApprovalEngine, NewRequest, SnapshotPaths};
use std::sync::Arc;
use tracing::info;

/// A fully wired governance instance
pub struct Governance {
    config: GovernanceConfig,
    registry: Arc<TeamRegistry>,
    ledger: Arc<RequestLedger>,
    audit: Arc<AuditLog>,
    engine: ApprovalEngine,
    visibility: VisibilityService,
}

impl Governance {
    /// Build a governance instance over the given cluster capability.
    ///
    /// With `config.data_dir` set, existing snapshots are loaded and every
    /// committed transition is persisted back; without it the instance is
    /// in-memory only.
    pub fn new(config: GovernanceConfig, cluster: Arc<dyn ClusterSync>) -> Result<Self> {
        config.validate()?;
        let environments = Arc::new(EnvironmentGraph::from_config(&config)?);

        let snapshots = config.data_dir.as_ref().map(SnapshotPaths::in_dir);

        let registry = Arc::new(match &snapshots {
            Some(paths) if paths.registry.exists() => {
                TeamRegistry::from_file(&paths.registry, config.admin_teams.clone())?
            }
            _ => TeamRegistry::with_admin_teams(config.admin_teams.clone()),
        });

        let ledger = Arc::new(match &snapshots {
            Some(paths) if paths.ledger.exists() => RequestLedger::from_file(&paths.ledger)?,
            _ => RequestLedger::new(),
        });

        let audit = Arc::new(match &config.data_dir {
            Some(dir) => AuditLog::to_file(dir.join("audit.jsonl")).map_err(|e| {
                GovernanceError::persistence("open audit log", e.to_string())
            })?,
            None => AuditLog::in_memory(),
        });

        let mut engine = ApprovalEngine::new(
            Arc::clone(&registry),
            Arc::clone(&ledger),
            Arc::clone(&environments),
            cluster,
        )
        .with_audit(Arc::clone(&audit))
        .with_topic_defaults(config.default_partitions, config.default_replication_factor);
        if let Some(paths) = snapshots {
            engine = engine.with_snapshots(paths);
        }

        let visibility = VisibilityService::new(
            Arc::clone(&registry),
            Arc::clone(&ledger),
            Arc::clone(&environments),
            config.page_size,
        );

        info!(
            environments = ?config.environments,
            topics = registry.len(),
            requests = ledger.len(),
            "Governance initialized"
        );

        Ok(Self {
            config,
            registry,
            ledger,
            audit,
            engine,
            visibility,
        })
    }

    /// Build an in-memory instance backed by [`InMemoryCluster`]
    pub fn in_memory(config: GovernanceConfig) -> Result<Self> {
        Self::new(config, Arc::new(InMemoryCluster::new()))
    }

    /// Submit a change request
    pub async fn submit(&self, request: NewRequest) -> Result<Request> {
        self.engine.submit(request).await
    }

    /// Approve a pending request and apply it
    pub async fn approve(&self, request_id: &str, approver_team: &str) -> Result<Request> {
        self.engine.approve(request_id, approver_team).await
    }

    /// Reject a pending request
    pub async fn reject(
        &self,
        request_id: &str,
        approver_team: &str,
        reason: impl Into<String>,
    ) -> Result<Request> {
        self.engine.reject(request_id, approver_team, reason).await
    }

    /// Cancel a pending request (requester team only)
    pub async fn cancel(&self, request_id: &str, caller_team: &str) -> Result<Request> {
        self.engine.cancel(request_id, caller_team).await
    }

    /// List topics visible to a team
    pub fn list_topics(
        &self,
        caller_team: &str,
        env: Option<&str>,
        page_request: PageRequest,
    ) -> Result<VisibilityPage> {
        self.visibility.list_topics(caller_team, env, page_request)
    }

    /// Describe the live cluster state of a topic
    pub async fn verify(&self, topic: &str, env: &str) -> Result<Option<TopicState>> {
        self.engine.verify(topic, env).await
    }

    /// All requests submitted by a team, newest first
    pub fn requests_for_team(&self, team: &str) -> Vec<Request> {
        self.ledger.requests_for_team(team)
    }

    /// Recent audit events, oldest first
    pub fn recent_audit(&self) -> Vec<AuditRecord> {
        self.audit.recent()
    }

    /// The active configuration
    pub fn config(&self) -> &GovernanceConfig {
        &self.config
    }

    /// The team registry
    pub fn registry(&self) -> &Arc<TeamRegistry> {
        &self.registry
    }

    /// The request ledger
    pub fn ledger(&self) -> &Arc<RequestLedger> {
        &self.ledger
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::RequestState;
    use crate::team::TopicKey;

    #[tokio::test]
    async fn test_in_memory_round_trip() {
        let governance = Governance::in_memory(GovernanceConfig::default()).unwrap();

        let request = governance
            .submit(NewRequest::create_topic("payments", "orders", "dev"))
            .await
            .unwrap();
        governance.approve(&request.id, "platform").await.unwrap();

        let page = governance
            .list_topics("payments", Some("dev"), PageRequest::first())
            .unwrap();
        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.entries[0].pending_sequence, 0);

        assert!(governance.verify("orders", "dev").await.unwrap().is_some());
        assert_eq!(governance.requests_for_team("payments").len(), 1);
        assert!(!governance.recent_audit().is_empty());
    }

    #[tokio::test]
    async fn test_restart_recovers_state() {
        let dir = tempfile::tempdir().unwrap();
        let config = GovernanceConfig::default().with_data_dir(dir.path());

        {
            let governance = Governance::in_memory(config.clone()).unwrap();
            let request = governance
                .submit(NewRequest::create_topic("payments", "orders", "dev"))
                .await
                .unwrap();
            governance.approve(&request.id, "platform").await.unwrap();
            governance
                .submit(NewRequest::grant_producer("checkout", "orders", "dev"))
                .await
                .unwrap();
        }

        // A fresh instance over the same data dir sees the committed state.
        let governance = Governance::in_memory(config).unwrap();
        let key = TopicKey::new("orders", "dev");
        assert_eq!(
            governance.registry().owner_of(&key),
            Some("payments".to_string())
        );

        let pending = governance.ledger().list_pending(&key);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].state, RequestState::Pending);
        // Sequence numbering resumes where it left off.
        assert_eq!(governance.ledger().next_sequence(&key), 3);
    }

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        let config = GovernanceConfig::default().with_page_size(0);
        assert!(Governance::in_memory(config).is_err());
    }
}
