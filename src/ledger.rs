//! Request ledger
//!
//! Append-and-update store for change requests. Every request gets a
//! sequence number that is strictly increasing and gap-free per
//! (topic, environment); pending requests for one key must be resolved in
//! sequence order. Requests are never deleted — terminal requests remain as
//! the audit record of the change.

use crate::error::{GovernanceError, Result};
use crate::team::TopicKey;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use uuid::Uuid;

/// The kind of change a request asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// Create a topic in the base environment
    CreateTopic,
    /// Promote a topic to the next environment
    PromoteTopic,
    /// Grant producer rights to the requesting team
    GrantProducer,
    /// Grant consumer rights to the requesting team
    GrantConsumer,
    /// Remove a topic from an environment
    DeleteTopic,
}

impl RequestKind {
    /// String form used in logs and error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::CreateTopic => "create_topic",
            RequestKind::PromoteTopic => "promote_topic",
            RequestKind::GrantProducer => "grant_producer",
            RequestKind::GrantConsumer => "grant_consumer",
            RequestKind::DeleteTopic => "delete_topic",
        }
    }

    /// Parse from string representation
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create_topic" => Some(RequestKind::CreateTopic),
            "promote_topic" => Some(RequestKind::PromoteTopic),
            "grant_producer" => Some(RequestKind::GrantProducer),
            "grant_consumer" => Some(RequestKind::GrantConsumer),
            "delete_topic" => Some(RequestKind::DeleteTopic),
            _ => None,
        }
    }
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestState {
    /// Awaiting an approver decision
    Pending,
    /// Approved; cluster sync in flight
    Approved,
    /// Approved and applied to the cluster and registry
    Applied,
    /// Declined by an approver (or cancelled by the requester)
    Rejected,
    /// Approved but the cluster sync failed; requires re-submission
    Failed,
}

impl RequestState {
    /// Terminal states admit no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestState::Applied | RequestState::Rejected | RequestState::Failed
        )
    }

    /// Open states block conflicting duplicate requests
    pub fn is_open(&self) -> bool {
        !self.is_terminal()
    }

    /// String form used in logs and error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestState::Pending => "pending",
            RequestState::Approved => "approved",
            RequestState::Applied => "applied",
            RequestState::Rejected => "rejected",
            RequestState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A topic/ACL change request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Request id
    pub id: String,
    /// Topic the change targets
    pub topic: String,
    /// Environment the change targets
    pub env: String,
    /// Kind of change
    pub kind: RequestKind,
    /// Team that submitted the request
    pub requester_team: String,
    /// Approval position among requests for the same (topic, environment)
    pub sequence: u64,
    /// Lifecycle state
    pub state: RequestState,
    /// Partition count for create kinds
    pub partitions: Option<i32>,
    /// Replication factor for create kinds
    pub replication_factor: Option<i16>,
    /// Submission timestamp (epoch millis)
    pub created_at_ms: i64,
    /// Resolution timestamp (epoch millis)
    pub resolved_at_ms: Option<i64>,
    /// Team that resolved the request
    pub approver_team: Option<String>,
    /// Reason given on rejection
    pub reject_reason: Option<String>,
    /// Cluster sync error detail when the request failed
    pub sync_error: Option<String>,
}

impl Request {
    /// Create a new pending request
    pub fn new(
        topic: impl Into<String>,
        env: impl Into<String>,
        kind: RequestKind,
        requester_team: impl Into<String>,
        sequence: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            topic: topic.into(),
            env: env.into(),
            kind,
            requester_team: requester_team.into(),
            sequence,
            state: RequestState::Pending,
            partitions: None,
            replication_factor: None,
            created_at_ms: chrono::Utc::now().timestamp_millis(),
            resolved_at_ms: None,
            approver_team: None,
            reject_reason: None,
            sync_error: None,
        }
    }

    /// Set topic sizing for create kinds
    pub fn with_sizing(mut self, partitions: i32, replication_factor: i16) -> Self {
        self.partitions = Some(partitions);
        self.replication_factor = Some(replication_factor);
        self
    }

    /// Key of the (topic, environment) the request targets
    pub fn key(&self) -> TopicKey {
        TopicKey::new(self.topic.clone(), self.env.clone())
    }

    /// Mark as approved, sync in flight
    pub fn approve(&mut self, approver_team: &str) {
        self.state = RequestState::Approved;
        self.approver_team = Some(approver_team.to_string());
    }

    /// Mark as applied
    pub fn apply(&mut self) {
        self.state = RequestState::Applied;
        self.resolved_at_ms = Some(chrono::Utc::now().timestamp_millis());
    }

    /// Mark as failed with the sync error detail
    pub fn fail(&mut self, detail: impl Into<String>) {
        self.state = RequestState::Failed;
        self.sync_error = Some(detail.into());
        self.resolved_at_ms = Some(chrono::Utc::now().timestamp_millis());
    }

    /// Mark as rejected with a reason
    pub fn reject(&mut self, approver_team: &str, reason: impl Into<String>) {
        self.state = RequestState::Rejected;
        self.approver_team = Some(approver_team.to_string());
        self.reject_reason = Some(reason.into());
        self.resolved_at_ms = Some(chrono::Utc::now().timestamp_millis());
    }
}

/// Ledger file format for YAML persistence
#[derive(Debug, Serialize, Deserialize)]
struct LedgerFile {
    requests: Vec<Request>,
}

/// Append-and-update store for requests, indexed by id and by
/// (topic, environment, sequence)
#[derive(Debug, Default)]
pub struct RequestLedger {
    /// All requests by id
    requests: DashMap<String, Request>,
    /// Request ids per (topic, environment)
    by_key: DashMap<TopicKey, Vec<String>>,
    /// Last assigned sequence per (topic, environment)
    sequences: DashMap<TopicKey, u64>,
}

impl RequestLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the ledger from a YAML file, rebuilding indexes and counters
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| GovernanceError::persistence("read ledger snapshot", e.to_string()))?;

        let file: LedgerFile = serde_yaml::from_str(&content)
            .map_err(|e| GovernanceError::persistence("parse ledger snapshot", e.to_string()))?;

        let ledger = Self::new();
        for request in file.requests {
            let key = request.key();
            let mut last = ledger.sequences.entry(key.clone()).or_insert(0);
            if request.sequence > *last {
                *last = request.sequence;
            }
            drop(last);
            ledger
                .by_key
                .entry(key)
                .or_default()
                .push(request.id.clone());
            ledger.requests.insert(request.id.clone(), request);
        }

        // Keep per-key id lists in sequence order.
        for mut entry in ledger.by_key.iter_mut() {
            let requests = &ledger.requests;
            entry
                .value_mut()
                .sort_by_key(|id| requests.get(id).map(|r| r.sequence).unwrap_or(u64::MAX));
        }

        Ok(ledger)
    }

    /// Save the ledger to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut requests: Vec<Request> = self.requests.iter().map(|e| e.value().clone()).collect();
        requests.sort_by(|a, b| a.key().cmp(&b.key()).then(a.sequence.cmp(&b.sequence)));
        let file = LedgerFile { requests };

        let content = serde_yaml::to_string(&file)
            .map_err(|e| GovernanceError::persistence("serialize ledger snapshot", e.to_string()))?;

        if let Some(parent) = path.as_ref().parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    GovernanceError::persistence("create snapshot directory", e.to_string())
                })?;
            }
        }

        fs::write(path.as_ref(), content)
            .map_err(|e| GovernanceError::persistence("write ledger snapshot", e.to_string()))
    }

    /// Assign the next sequence number for a (topic, environment).
    ///
    /// Strictly increasing and gap-free per key; concurrent callers are
    /// serialized on the key's map entry. Sequences start at 1.
    pub fn next_sequence(&self, key: &TopicKey) -> u64 {
        let mut entry = self.sequences.entry(key.clone()).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Store a newly submitted request
    pub fn insert(&self, request: Request) {
        self.by_key
            .entry(request.key())
            .or_default()
            .push(request.id.clone());
        self.requests.insert(request.id.clone(), request);
    }

    /// Undo an insert whose durable commit failed, releasing its sequence.
    ///
    /// Only valid for the most recently assigned sequence of the key, while
    /// the submitter still holds the per-key workflow lock.
    pub fn unwind_insert(&self, request: &Request) {
        let key = request.key();
        if let Some(mut ids) = self.by_key.get_mut(&key) {
            ids.retain(|id| id != &request.id);
        }
        self.requests.remove(&request.id);
        if let Some(mut last) = self.sequences.get_mut(&key) {
            if *last == request.sequence {
                *last -= 1;
            }
        }
    }

    /// Get a request by id
    pub fn get(&self, id: &str) -> Option<Request> {
        self.requests.get(id).map(|r| r.value().clone())
    }

    /// Mutate a request under the map entry lock and return the result
    pub fn update<F>(&self, id: &str, f: F) -> Result<Request>
    where
        F: FnOnce(&mut Request),
    {
        let mut entry = self
            .requests
            .get_mut(id)
            .ok_or_else(|| GovernanceError::RequestNotFound(id.to_string()))?;
        f(entry.value_mut());
        Ok(entry.value().clone())
    }

    /// Pending requests for a (topic, environment), in sequence order
    pub fn list_pending(&self, key: &TopicKey) -> Vec<Request> {
        let ids = match self.by_key.get(key) {
            Some(ids) => ids.clone(),
            None => return Vec::new(),
        };

        let mut pending: Vec<Request> = ids
            .iter()
            .filter_map(|id| self.get(id))
            .filter(|r| r.state == RequestState::Pending)
            .collect();
        pending.sort_by_key(|r| r.sequence);
        pending
    }

    /// Lowest pending sequence for a (topic, environment), if any
    pub fn min_pending_sequence(&self, key: &TopicKey) -> Option<u64> {
        self.list_pending(key).first().map(|r| r.sequence)
    }

    /// Pending sequence reported in visibility listings (0 when none)
    pub fn pending_sequence(&self, key: &TopicKey) -> u64 {
        self.min_pending_sequence(key).unwrap_or(0)
    }

    /// Whether an unresolved request of this kind exists for the key
    pub fn has_open(&self, key: &TopicKey, kind: RequestKind) -> bool {
        let ids = match self.by_key.get(key) {
            Some(ids) => ids.clone(),
            None => return false,
        };
        ids.iter()
            .filter_map(|id| self.get(id))
            .any(|r| r.kind == kind && r.state.is_open())
    }

    /// All requests submitted by a team, newest first
    pub fn requests_for_team(&self, team: &str) -> Vec<Request> {
        let mut requests: Vec<Request> = self
            .requests
            .iter()
            .filter(|e| e.value().requester_team == team)
            .map(|e| e.value().clone())
            .collect();
        requests.sort_by(|a, b| b.created_at_ms.cmp(&a.created_at_ms).then(b.sequence.cmp(&a.sequence)));
        requests
    }

    /// Number of requests in the ledger
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Whether the ledger is empty
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}
