//! Governance audit trail
//!
//! Every request lifecycle event is recorded as a JSON line, giving
//! operators a durable account of who asked for what, who resolved it, and
//! what the cluster did about it. A bounded in-memory tail backs activity
//! views without re-reading the log file.

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::error;

/// Maximum number of events kept in the in-memory tail
const DEFAULT_RECENT_CAPACITY: usize = 1000;

/// Governance lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum GovernanceEvent {
    /// A request entered the ledger
    #[serde(rename = "REQUEST_SUBMITTED")]
    RequestSubmitted {
        request_id: String,
        team: String,
        topic: String,
        env: String,
        kind: String,
        sequence: u64,
    },

    /// A request was approved and handed to cluster sync
    #[serde(rename = "REQUEST_APPROVED")]
    RequestApproved {
        request_id: String,
        approver_team: String,
        topic: String,
        env: String,
    },

    /// A request was declined (or cancelled by its requester)
    #[serde(rename = "REQUEST_REJECTED")]
    RequestRejected {
        request_id: String,
        approver_team: String,
        topic: String,
        env: String,
        reason: String,
    },

    /// The approved change was applied to cluster and registry
    #[serde(rename = "CHANGE_APPLIED")]
    ChangeApplied {
        request_id: String,
        topic: String,
        env: String,
        kind: String,
    },

    /// Cluster sync rejected the change; the request is failed
    #[serde(rename = "SYNC_FAILED")]
    SyncFailed {
        request_id: String,
        topic: String,
        env: String,
        detail: String,
    },
}

/// An audit record with its timestamp
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Event timestamp (RFC 3339)
    pub timestamp: String,
    /// The event
    #[serde(flatten)]
    pub event: GovernanceEvent,
}

/// Append-only audit log with a bounded in-memory tail
pub struct AuditLog {
    /// JSONL writer (None = in-memory only)
    writer: Option<Mutex<BufWriter<std::fs::File>>>,
    /// Path of the log file, for diagnostics
    path: Option<PathBuf>,
    /// Recent events, newest last
    recent: Mutex<VecDeque<AuditRecord>>,
    /// Capacity of the tail
    recent_capacity: usize,
}

impl AuditLog {
    /// Create an in-memory audit log (no file backing)
    pub fn in_memory() -> Self {
        Self {
            writer: None,
            path: None,
            recent: Mutex::new(VecDeque::new()),
            recent_capacity: DEFAULT_RECENT_CAPACITY,
        }
    }

    /// Create an audit log appending to a JSONL file
    pub fn to_file(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            writer: Some(Mutex::new(BufWriter::new(file))),
            path: Some(path),
            recent: Mutex::new(VecDeque::new()),
            recent_capacity: DEFAULT_RECENT_CAPACITY,
        })
    }

    /// Record an event.
    ///
    /// Audit writes never fail the workflow that produced the event; file
    /// errors are logged and the in-memory tail still receives the record.
    pub fn record(&self, event: GovernanceEvent) {
        let record = AuditRecord {
            timestamp: Utc::now().to_rfc3339(),
            event,
        };

        if let Some(writer) = &self.writer {
            match serde_json::to_string(&record) {
                Ok(line) => {
                    let mut writer = writer.lock();
                    if let Err(e) = writeln!(writer, "{}", line).and_then(|_| writer.flush()) {
                        error!(path = ?self.path, error = %e, "Failed to write audit record");
                    }
                }
                Err(e) => error!(error = %e, "Failed to serialize audit record"),
            }
        }

        let mut recent = self.recent.lock();
        if recent.len() == self.recent_capacity {
            recent.pop_front();
        }
        recent.push_back(record);
    }

    /// The most recent events, oldest first
    pub fn recent(&self) -> Vec<AuditRecord> {
        self.recent.lock().iter().cloned().collect()
    }

    /// Number of events in the in-memory tail
    pub fn len(&self) -> usize {
        self.recent.lock().len()
    }

    /// Whether the tail is empty
    pub fn is_empty(&self) -> bool {
        self.recent.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submitted(request_id: &str) -> GovernanceEvent {
        GovernanceEvent::RequestSubmitted {
            request_id: request_id.to_string(),
            team: "payments".to_string(),
            topic: "orders".to_string(),
            env: "dev".to_string(),
            kind: "create_topic".to_string(),
            sequence: 1,
        }
    }

    #[test]
    fn test_in_memory_tail() {
        let log = AuditLog::in_memory();
        log.record(submitted("r1"));
        log.record(GovernanceEvent::ChangeApplied {
            request_id: "r1".to_string(),
            topic: "orders".to_string(),
            env: "dev".to_string(),
            kind: "create_topic".to_string(),
        });

        let recent = log.recent();
        assert_eq!(recent.len(), 2);
        assert!(matches!(
            recent[0].event,
            GovernanceEvent::RequestSubmitted { .. }
        ));
    }

    #[test]
    fn test_file_log_is_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        let log = AuditLog::to_file(&path).unwrap();
        log.record(submitted("r1"));
        log.record(submitted("r2"));

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: AuditRecord = serde_json::from_str(lines[0]).unwrap();
        assert!(matches!(
            parsed.event,
            GovernanceEvent::RequestSubmitted { ref request_id, .. } if request_id == "r1"
        ));
    }

    #[test]
    fn test_tail_is_bounded() {
        let mut log = AuditLog::in_memory();
        log.recent_capacity = 3;

        for i in 0..5 {
            log.record(submitted(&format!("r{}", i)));
        }

        let recent = log.recent();
        assert_eq!(recent.len(), 3);
        assert!(matches!(
            recent[0].event,
            GovernanceEvent::RequestSubmitted { ref request_id, .. } if request_id == "r2"
        ));
    }
}
