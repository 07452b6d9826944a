//! Team registry and topic ownership
//!
//! The registry resolves which team owns a topic in a given environment and
//! which teams hold producer or consumer rights on it. Producer/consumer
//! relations are set-typed with O(1) membership checks. The registry is only
//! mutated by the approval workflow when a request reaches `Applied`;
//! visibility reads take lock-free snapshots at any time.

use crate::error::{GovernanceError, Result};
use crate::ledger::RequestKind;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Identity of a topic within one environment
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TopicKey {
    /// Topic name
    pub name: String,
    /// Environment name
    pub env: String,
}

impl TopicKey {
    /// Create a new topic key
    pub fn new(name: impl Into<String>, env: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            env: env.into(),
        }
    }
}

impl std::fmt::Display for TopicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.env)
    }
}

/// A governed topic in one environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicRecord {
    /// Topic name
    pub name: String,
    /// Environment the record lives in
    pub env: String,
    /// Team that owns the topic
    pub owner_team: String,
    /// Teams granted producer rights
    #[serde(default)]
    pub producer_teams: BTreeSet<String>,
    /// Teams granted consumer rights
    #[serde(default)]
    pub consumer_teams: BTreeSet<String>,
    /// Partition count (opaque to governance logic)
    pub partitions: i32,
    /// Replication factor (opaque to governance logic)
    pub replication_factor: i16,
    /// Creation timestamp (epoch millis)
    pub created_at_ms: i64,
}

impl TopicRecord {
    /// Create a new topic record owned by `owner_team`
    pub fn new(
        name: impl Into<String>,
        env: impl Into<String>,
        owner_team: impl Into<String>,
        partitions: i32,
        replication_factor: i16,
    ) -> Self {
        Self {
            name: name.into(),
            env: env.into(),
            owner_team: owner_team.into(),
            producer_teams: BTreeSet::new(),
            consumer_teams: BTreeSet::new(),
            partitions,
            replication_factor,
            created_at_ms: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Key identifying this record
    pub fn key(&self) -> TopicKey {
        TopicKey::new(self.name.clone(), self.env.clone())
    }

    /// Whether the team owns this topic
    pub fn is_owner(&self, team: &str) -> bool {
        self.owner_team == team
    }

    /// Whether the team may see this topic (owner, producer, or consumer)
    pub fn is_visible_to(&self, team: &str) -> bool {
        self.is_owner(team)
            || self.producer_teams.contains(team)
            || self.consumer_teams.contains(team)
    }

    /// All teams with any relation to this topic, sorted and deduplicated
    pub fn related_teams(&self) -> Vec<String> {
        let mut teams: BTreeSet<String> = BTreeSet::new();
        teams.insert(self.owner_team.clone());
        teams.extend(self.producer_teams.iter().cloned());
        teams.extend(self.consumer_teams.iter().cloned());
        teams.into_iter().collect()
    }
}

/// Registry file format for YAML persistence
#[derive(Debug, Serialize, Deserialize)]
struct RegistryFile {
    topics: Vec<TopicRecord>,
}

/// Resolves topic ownership and producer/consumer rights per environment
#[derive(Debug, Default)]
pub struct TeamRegistry {
    /// Live topic set
    topics: DashMap<TopicKey, TopicRecord>,
    /// Teams that may view and administer everything
    admin_teams: BTreeSet<String>,
}

impl TeamRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the given admin teams
    pub fn with_admin_teams(admin_teams: BTreeSet<String>) -> Self {
        Self {
            topics: DashMap::new(),
            admin_teams,
        }
    }

    /// Load the live topic set from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P, admin_teams: BTreeSet<String>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            GovernanceError::persistence("read registry snapshot", e.to_string())
        })?;

        let file: RegistryFile = serde_yaml::from_str(&content).map_err(|e| {
            GovernanceError::persistence("parse registry snapshot", e.to_string())
        })?;

        let registry = Self::with_admin_teams(admin_teams);
        for record in file.topics {
            registry.topics.insert(record.key(), record);
        }
        Ok(registry)
    }

    /// Save the live topic set to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut topics = self.all_topics();
        topics.sort_by(|a, b| a.key().cmp(&b.key()));
        let file = RegistryFile { topics };

        let content = serde_yaml::to_string(&file).map_err(|e| {
            GovernanceError::persistence("serialize registry snapshot", e.to_string())
        })?;

        if let Some(parent) = path.as_ref().parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    GovernanceError::persistence("create snapshot directory", e.to_string())
                })?;
            }
        }

        fs::write(path.as_ref(), content)
            .map_err(|e| GovernanceError::persistence("write registry snapshot", e.to_string()))
    }

    /// Whether the team is an admin team
    pub fn is_admin(&self, team: &str) -> bool {
        self.admin_teams.contains(team)
    }

    /// Get a topic record
    pub fn get(&self, key: &TopicKey) -> Option<TopicRecord> {
        self.topics.get(key).map(|r| r.value().clone())
    }

    /// Whether the topic exists in the given environment
    pub fn contains(&self, key: &TopicKey) -> bool {
        self.topics.contains_key(key)
    }

    /// Owning team of a topic in an environment
    pub fn owner_of(&self, key: &TopicKey) -> Option<String> {
        self.topics.get(key).map(|r| r.owner_team.clone())
    }

    /// Teams granted producer rights on a topic in an environment
    pub fn producers_of(&self, key: &TopicKey) -> BTreeSet<String> {
        self.topics
            .get(key)
            .map(|r| r.producer_teams.clone())
            .unwrap_or_default()
    }

    /// Teams granted consumer rights on a topic in an environment
    pub fn consumers_of(&self, key: &TopicKey) -> BTreeSet<String> {
        self.topics
            .get(key)
            .map(|r| r.consumer_teams.clone())
            .unwrap_or_default()
    }

    /// Environments where the topic currently exists
    pub fn environments_of(&self, topic: &str) -> Vec<String> {
        self.topics
            .iter()
            .filter(|entry| entry.key().name == topic)
            .map(|entry| entry.key().env.clone())
            .collect()
    }

    /// Owning team of a topic in any environment.
    ///
    /// Ownership is uniform across environments (promotion carries the
    /// owner), so any record answers the question.
    pub fn owner_anywhere(&self, topic: &str) -> Option<String> {
        self.topics
            .iter()
            .find(|entry| entry.key().name == topic)
            .map(|entry| entry.value().owner_team.clone())
    }

    /// Check whether a team may submit a request of the given kind.
    ///
    /// Returns the specific refusal; use [`TeamRegistry::can_request`] for a
    /// boolean answer.
    pub fn authorize(&self, team: &str, topic: &str, env: &str, kind: RequestKind) -> Result<()> {
        let key = TopicKey::new(topic, env);

        match kind {
            RequestKind::CreateTopic => {
                if self.contains(&key) {
                    return Err(GovernanceError::TopicAlreadyExists {
                        topic: topic.to_string(),
                        env: env.to_string(),
                    });
                }
                // A brand-new name may be claimed by any team; an existing
                // name stays with its owner.
                if let Some(owner) = self.owner_anywhere(topic) {
                    if owner != team {
                        return Err(GovernanceError::unauthorized(
                            team,
                            format!("create '{}' owned by team '{}'", topic, owner),
                        ));
                    }
                }
                Ok(())
            }
            RequestKind::PromoteTopic => match self.owner_anywhere(topic) {
                None => Err(GovernanceError::TopicNotFound {
                    topic: topic.to_string(),
                    env: env.to_string(),
                }),
                Some(owner) if owner != team => Err(GovernanceError::unauthorized(
                    team,
                    format!("promote '{}' owned by team '{}'", topic, owner),
                )),
                Some(_) => Ok(()),
            },
            RequestKind::DeleteTopic => {
                let record = self.get(&key).ok_or_else(|| GovernanceError::TopicNotFound {
                    topic: topic.to_string(),
                    env: env.to_string(),
                })?;
                if !record.is_owner(team) {
                    return Err(GovernanceError::unauthorized(
                        team,
                        format!("delete '{}' owned by team '{}'", topic, record.owner_team),
                    ));
                }
                Ok(())
            }
            RequestKind::GrantProducer | RequestKind::GrantConsumer => {
                let record = self.get(&key).ok_or_else(|| GovernanceError::TopicNotFound {
                    topic: topic.to_string(),
                    env: env.to_string(),
                })?;

                let (role, granted) = match kind {
                    RequestKind::GrantProducer => ("producer", &record.producer_teams),
                    _ => ("consumer", &record.consumer_teams),
                };

                // The owner holds produce/consume rights implicitly.
                if record.is_owner(team) || granted.contains(team) {
                    return Err(GovernanceError::AlreadyAuthorized {
                        team: team.to_string(),
                        role: role.to_string(),
                        topic: topic.to_string(),
                        env: env.to_string(),
                    });
                }
                Ok(())
            }
        }
    }

    /// Boolean form of [`TeamRegistry::authorize`]
    pub fn can_request(&self, team: &str, topic: &str, env: &str, kind: RequestKind) -> bool {
        self.authorize(team, topic, env, kind).is_ok()
    }

    /// Insert a topic record (workflow engine only, on `Applied`)
    pub fn insert_topic(&self, record: TopicRecord) {
        info!(topic = %record.key(), owner = %record.owner_team, "Topic registered");
        self.topics.insert(record.key(), record);
    }

    /// Add a producer team to a topic (workflow engine only, on `Applied`)
    pub fn add_producer(&self, key: &TopicKey, team: &str) -> Result<()> {
        let mut record = self
            .topics
            .get_mut(key)
            .ok_or_else(|| GovernanceError::TopicNotFound {
                topic: key.name.clone(),
                env: key.env.clone(),
            })?;
        record.producer_teams.insert(team.to_string());
        debug!(topic = %key, team = %team, "Producer grant applied");
        Ok(())
    }

    /// Add a consumer team to a topic (workflow engine only, on `Applied`)
    pub fn add_consumer(&self, key: &TopicKey, team: &str) -> Result<()> {
        let mut record = self
            .topics
            .get_mut(key)
            .ok_or_else(|| GovernanceError::TopicNotFound {
                topic: key.name.clone(),
                env: key.env.clone(),
            })?;
        record.consumer_teams.insert(team.to_string());
        debug!(topic = %key, team = %team, "Consumer grant applied");
        Ok(())
    }

    /// Remove a topic from the live set (workflow engine only, on `Applied`)
    pub fn remove_topic(&self, key: &TopicKey) -> Result<()> {
        self.topics
            .remove(key)
            .ok_or_else(|| GovernanceError::TopicNotFound {
                topic: key.name.clone(),
                env: key.env.clone(),
            })?;
        info!(topic = %key, "Topic removed from live set");
        Ok(())
    }

    /// Snapshot of all live topic records
    pub fn all_topics(&self) -> Vec<TopicRecord> {
        self.topics.iter().map(|e| e.value().clone()).collect()
    }

    /// Snapshot of topics visible to the team (admins see everything)
    pub fn topics_visible_to(&self, team: &str) -> Vec<TopicRecord> {
        if self.is_admin(team) {
            return self.all_topics();
        }
        self.topics
            .iter()
            .filter(|e| e.value().is_visible_to(team))
            .map(|e| e.value().clone())
            .collect()
    }

    /// Number of live topic records
    pub fn len(&self) -> usize {
        self.topics.len()
    }

    /// Whether the live set is empty
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}
