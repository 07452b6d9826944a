//! Cluster synchronization capability
//!
//! The governance core never speaks the broker wire protocol itself; it
//! hands an approved change to a [`ClusterSync`] implementation and records
//! the outcome. Implementations must make `apply` idempotent — the core
//! relies on that to mark a request `Failed` and accept a clean
//! re-submission without risking a double-applied change.

use crate::error::{GovernanceError, Result};
use crate::team::TopicKey;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// A change to apply on the live cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum ClusterChange {
    /// Create a topic in an environment's cluster
    CreateTopic {
        name: String,
        env: String,
        partitions: i32,
        replication_factor: i16,
    },
    /// Grant a team produce access
    AddProducerAcl {
        topic: String,
        env: String,
        team: String,
    },
    /// Grant a team consume access
    AddConsumerAcl {
        topic: String,
        env: String,
        team: String,
    },
    /// Delete a topic from an environment's cluster
    DeleteTopic { name: String, env: String },
}

impl ClusterChange {
    /// The (topic, environment) the change targets
    pub fn key(&self) -> TopicKey {
        match self {
            ClusterChange::CreateTopic { name, env, .. }
            | ClusterChange::DeleteTopic { name, env } => TopicKey::new(name.clone(), env.clone()),
            ClusterChange::AddProducerAcl { topic, env, .. }
            | ClusterChange::AddConsumerAcl { topic, env, .. } => {
                TopicKey::new(topic.clone(), env.clone())
            }
        }
    }
}

impl std::fmt::Display for ClusterChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusterChange::CreateTopic {
                name,
                env,
                partitions,
                ..
            } => write!(f, "create topic '{}' in '{}' ({} partitions)", name, env, partitions),
            ClusterChange::AddProducerAcl { topic, env, team } => {
                write!(f, "grant producer '{}' on '{}' in '{}'", team, topic, env)
            }
            ClusterChange::AddConsumerAcl { topic, env, team } => {
                write!(f, "grant consumer '{}' on '{}' in '{}'", team, topic, env)
            }
            ClusterChange::DeleteTopic { name, env } => {
                write!(f, "delete topic '{}' in '{}'", name, env)
            }
        }
    }
}

/// Observed state of a topic on the live cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicState {
    /// Topic name
    pub name: String,
    /// Environment
    pub env: String,
    /// Partition count
    pub partitions: i32,
    /// Replication factor
    pub replication_factor: i16,
    /// Teams with produce access
    pub producer_teams: BTreeSet<String>,
    /// Teams with consume access
    pub consumer_teams: BTreeSet<String>,
}

/// Capability to apply and verify topic/ACL state on the live cluster.
///
/// `apply` must be idempotent: re-applying an already-applied change must
/// leave the cluster unchanged and report success.
#[async_trait]
pub trait ClusterSync: Send + Sync {
    /// Apply a change to the cluster
    async fn apply(&self, change: &ClusterChange) -> Result<()>;

    /// Describe the current state of a topic, if present
    async fn describe(&self, topic: &str, env: &str) -> Result<Option<TopicState>>;
}

/// In-memory cluster for embedded and test use.
///
/// Holds per-environment topic state in process; all operations are
/// idempotent as the [`ClusterSync`] contract requires.
#[derive(Debug, Default)]
pub struct InMemoryCluster {
    topics: DashMap<TopicKey, TopicState>,
}

impl InMemoryCluster {
    /// Create an empty in-memory cluster
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the topic exists in the environment
    pub fn contains(&self, topic: &str, env: &str) -> bool {
        self.topics.contains_key(&TopicKey::new(topic, env))
    }

    /// Number of topics across all environments
    pub fn len(&self) -> usize {
        self.topics.len()
    }

    /// Whether the cluster holds no topics
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

#[async_trait]
impl ClusterSync for InMemoryCluster {
    async fn apply(&self, change: &ClusterChange) -> Result<()> {
        debug!(change = %change, "Applying change to in-memory cluster");
        match change {
            ClusterChange::CreateTopic {
                name,
                env,
                partitions,
                replication_factor,
            } => {
                self.topics
                    .entry(TopicKey::new(name.clone(), env.clone()))
                    .or_insert_with(|| TopicState {
                        name: name.clone(),
                        env: env.clone(),
                        partitions: *partitions,
                        replication_factor: *replication_factor,
                        producer_teams: BTreeSet::new(),
                        consumer_teams: BTreeSet::new(),
                    });
                Ok(())
            }
            ClusterChange::AddProducerAcl { topic, env, team } => {
                let key = TopicKey::new(topic.clone(), env.clone());
                let mut state = self.topics.get_mut(&key).ok_or_else(|| {
                    GovernanceError::SyncFailure(format!("topic '{}' missing in '{}'", topic, env))
                })?;
                state.producer_teams.insert(team.clone());
                Ok(())
            }
            ClusterChange::AddConsumerAcl { topic, env, team } => {
                let key = TopicKey::new(topic.clone(), env.clone());
                let mut state = self.topics.get_mut(&key).ok_or_else(|| {
                    GovernanceError::SyncFailure(format!("topic '{}' missing in '{}'", topic, env))
                })?;
                state.consumer_teams.insert(team.clone());
                Ok(())
            }
            ClusterChange::DeleteTopic { name, env } => {
                self.topics.remove(&TopicKey::new(name.clone(), env.clone()));
                Ok(())
            }
        }
    }

    async fn describe(&self, topic: &str, env: &str) -> Result<Option<TopicState>> {
        Ok(self
            .topics
            .get(&TopicKey::new(topic, env))
            .map(|s| s.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_orders() -> ClusterChange {
        ClusterChange::CreateTopic {
            name: "orders".to_string(),
            env: "dev".to_string(),
            partitions: 3,
            replication_factor: 1,
        }
    }

    #[tokio::test]
    async fn test_create_and_describe() {
        let cluster = InMemoryCluster::new();
        cluster.apply(&create_orders()).await.unwrap();

        let state = cluster.describe("orders", "dev").await.unwrap().unwrap();
        assert_eq!(state.partitions, 3);
        assert!(cluster.describe("orders", "prod").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_apply_is_idempotent() {
        let cluster = InMemoryCluster::new();
        cluster.apply(&create_orders()).await.unwrap();

        let grant = ClusterChange::AddProducerAcl {
            topic: "orders".to_string(),
            env: "dev".to_string(),
            team: "checkout".to_string(),
        };
        cluster.apply(&grant).await.unwrap();
        cluster.apply(&grant).await.unwrap();
        // Re-creating must not reset existing state.
        cluster.apply(&create_orders()).await.unwrap();

        let state = cluster.describe("orders", "dev").await.unwrap().unwrap();
        assert_eq!(state.producer_teams.len(), 1);
        assert_eq!(cluster.len(), 1);
    }

    #[tokio::test]
    async fn test_acl_on_missing_topic_fails() {
        let cluster = InMemoryCluster::new();
        let grant = ClusterChange::AddConsumerAcl {
            topic: "orders".to_string(),
            env: "dev".to_string(),
            team: "analytics".to_string(),
        };
        let err = cluster.apply(&grant).await.unwrap_err();
        assert!(matches!(err, GovernanceError::SyncFailure(_)));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let cluster = InMemoryCluster::new();
        cluster.apply(&create_orders()).await.unwrap();

        let delete = ClusterChange::DeleteTopic {
            name: "orders".to_string(),
            env: "dev".to_string(),
        };
        cluster.apply(&delete).await.unwrap();
        cluster.apply(&delete).await.unwrap();
        assert!(cluster.is_empty());
    }
}
