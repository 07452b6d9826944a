//! Visibility query service
//!
//! Paginated, team-filtered listings of governed topics. A listing combines
//! the team registry's live topic set with the ledger's pending-request
//! sequence, ordered deterministically and paged at the configured size.
//! Pagination metadata is derived from the result set on every query, never
//! stored. Pure read path: snapshot iteration only, no keyed locks.

use crate::environment::EnvironmentGraph;
use crate::error::{GovernanceError, Result};
use crate::ledger::RequestLedger;
use crate::team::{TeamRegistry, TopicRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A page selection, 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Requested page number (first page is 1)
    pub page: usize,
}

impl PageRequest {
    /// Select a page; page numbers below 1 are clamped to 1
    pub fn new(page: usize) -> Self {
        Self { page: page.max(1) }
    }

    /// The first page
    pub fn first() -> Self {
        Self { page: 1 }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::first()
    }
}

/// One topic in a visibility listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamView {
    /// Topic name
    pub topic_name: String,
    /// Environment
    pub env: String,
    /// Teams granted producer rights
    pub producer_teams: Vec<String>,
    /// Teams granted consumer rights
    pub consumer_teams: Vec<String>,
    /// Teams permitted to view the topic (owner plus grantees)
    pub possible_teams: Vec<String>,
    /// Lowest pending request sequence for the topic (0 when none)
    pub pending_sequence: u64,
}

/// One page of a visibility listing with derived pagination metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibilityPage {
    /// Entries on this page
    pub entries: Vec<StreamView>,
    /// The page these entries belong to
    pub page: usize,
    /// Total number of pages for the filtered result set
    pub total_pages: usize,
    /// Valid page numbers (1..=total_pages)
    pub page_numbers: Vec<usize>,
}

/// Answers team-scoped listing queries over registry and ledger
pub struct VisibilityService {
    registry: Arc<TeamRegistry>,
    ledger: Arc<RequestLedger>,
    environments: Arc<EnvironmentGraph>,
    page_size: usize,
}

impl VisibilityService {
    /// Create a service reading the given registry and ledger
    pub fn new(
        registry: Arc<TeamRegistry>,
        ledger: Arc<RequestLedger>,
        environments: Arc<EnvironmentGraph>,
        page_size: usize,
    ) -> Self {
        Self {
            registry,
            ledger,
            environments,
            page_size: page_size.max(1),
        }
    }

    /// List topics visible to a team.
    ///
    /// A non-admin caller sees only topics where it is owner, producer, or
    /// consumer; admin teams see everything. Results are ordered by topic
    /// name, then environment rank. `env` narrows the listing to one
    /// environment.
    pub fn list_topics(
        &self,
        caller_team: &str,
        env: Option<&str>,
        page_request: PageRequest,
    ) -> Result<VisibilityPage> {
        if let Some(env) = env {
            if !self.environments.contains(env) {
                return Err(GovernanceError::UnknownEnvironment(env.to_string()));
            }
        }

        let mut records: Vec<TopicRecord> = self
            .registry
            .topics_visible_to(caller_team)
            .into_iter()
            .filter(|record| env.map_or(true, |e| record.env == e))
            .collect();

        records.sort_by(|a, b| {
            a.name.cmp(&b.name).then_with(|| {
                let rank_a = self.environments.rank(&a.env).unwrap_or(usize::MAX);
                let rank_b = self.environments.rank(&b.env).unwrap_or(usize::MAX);
                rank_a.cmp(&rank_b)
            })
        });

        let total_pages = records.len().div_ceil(self.page_size);
        let page = page_request.page;
        let start = (page - 1).saturating_mul(self.page_size);

        let entries = records
            .into_iter()
            .skip(start)
            .take(self.page_size)
            .map(|record| self.view_of(record))
            .collect();

        Ok(VisibilityPage {
            entries,
            page,
            total_pages,
            page_numbers: (1..=total_pages).collect(),
        })
    }

    fn view_of(&self, record: TopicRecord) -> StreamView {
        let pending_sequence = self.ledger.pending_sequence(&record.key());
        StreamView {
            topic_name: record.name.clone(),
            env: record.env.clone(),
            producer_teams: record.producer_teams.iter().cloned().collect(),
            consumer_teams: record.consumer_teams.iter().cloned().collect(),
            possible_teams: record.related_teams(),
            pending_sequence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{Request, RequestKind};
    use crate::team::TopicKey;

    fn record(name: &str, env: &str, owner: &str) -> TopicRecord {
        TopicRecord::new(name, env, owner, 1, 1)
    }

    fn service(page_size: usize) -> (VisibilityService, Arc<TeamRegistry>, Arc<RequestLedger>) {
        let registry = Arc::new(TeamRegistry::new());
        let ledger = Arc::new(RequestLedger::new());
        let environments = Arc::new(EnvironmentGraph::new(["dev", "test", "prod"]).unwrap());
        let service = VisibilityService::new(
            Arc::clone(&registry),
            Arc::clone(&ledger),
            environments,
            page_size,
        );
        (service, registry, ledger)
    }

    #[test]
    fn test_non_member_sees_nothing() {
        let (service, registry, _) = service(10);
        registry.insert_topic(record("orders", "dev", "payments"));

        let page = service
            .list_topics("billing", None, PageRequest::first())
            .unwrap();
        assert!(page.entries.is_empty());
        assert_eq!(page.total_pages, 0);
        assert!(page.page_numbers.is_empty());
    }

    #[test]
    fn test_member_roles_grant_visibility() {
        let (service, registry, _) = service(10);
        let mut orders = record("orders", "dev", "payments");
        orders.producer_teams.insert("checkout".to_string());
        orders.consumer_teams.insert("analytics".to_string());
        registry.insert_topic(orders);
        registry.insert_topic(record("invoices", "dev", "billing"));

        for team in ["payments", "checkout", "analytics"] {
            let page = service.list_topics(team, None, PageRequest::first()).unwrap();
            assert_eq!(page.entries.len(), 1, "team {} should see orders", team);
            assert_eq!(page.entries[0].topic_name, "orders");
        }

        let view = &service
            .list_topics("payments", None, PageRequest::first())
            .unwrap()
            .entries[0];
        assert_eq!(view.possible_teams, vec!["analytics", "checkout", "payments"]);
        assert_eq!(view.producer_teams, vec!["checkout"]);
        assert_eq!(view.consumer_teams, vec!["analytics"]);
    }

    #[test]
    fn test_ordering_by_name_then_environment_rank() {
        let (service, registry, _) = service(10);
        registry.insert_topic(record("orders", "test", "payments"));
        registry.insert_topic(record("orders", "dev", "payments"));
        registry.insert_topic(record("invoices", "prod", "payments"));

        let page = service
            .list_topics("payments", None, PageRequest::first())
            .unwrap();
        let keys: Vec<(String, String)> = page
            .entries
            .iter()
            .map(|e| (e.topic_name.clone(), e.env.clone()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("invoices".to_string(), "prod".to_string()),
                ("orders".to_string(), "dev".to_string()),
                ("orders".to_string(), "test".to_string()),
            ]
        );
    }

    #[test]
    fn test_environment_filter() {
        let (service, registry, _) = service(10);
        registry.insert_topic(record("orders", "dev", "payments"));
        registry.insert_topic(record("orders", "test", "payments"));

        let page = service
            .list_topics("payments", Some("test"), PageRequest::first())
            .unwrap();
        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.entries[0].env, "test");

        let err = service
            .list_topics("payments", Some("staging"), PageRequest::first())
            .unwrap_err();
        assert!(matches!(err, GovernanceError::UnknownEnvironment(_)));
    }

    #[test]
    fn test_pagination_metadata_is_derived() {
        let (service, registry, _) = service(2);
        for i in 0..5 {
            registry.insert_topic(record(&format!("topic-{}", i), "dev", "payments"));
        }

        let page = service
            .list_topics("payments", None, PageRequest::first())
            .unwrap();
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.page_numbers, vec![1, 2, 3]);
        assert_eq!(page.entries.len(), 2);

        let last = service
            .list_topics("payments", None, PageRequest::new(3))
            .unwrap();
        assert_eq!(last.entries.len(), 1);

        // A page past the end is empty but keeps correct metadata.
        let past = service
            .list_topics("payments", None, PageRequest::new(9))
            .unwrap();
        assert!(past.entries.is_empty());
        assert_eq!(past.total_pages, 3);
    }

    #[test]
    fn test_pending_sequence_attached() {
        let (service, registry, ledger) = service(10);
        registry.insert_topic(record("orders", "dev", "payments"));

        let key = TopicKey::new("orders", "dev");
        let sequence = ledger.next_sequence(&key);
        ledger.insert(Request::new(
            "orders",
            "dev",
            RequestKind::GrantProducer,
            "checkout",
            sequence,
        ));

        let page = service
            .list_topics("payments", None, PageRequest::first())
            .unwrap();
        assert_eq!(page.entries[0].pending_sequence, 1);
    }

    #[test]
    fn test_pending_sequence_zero_without_open_requests() {
        let (service, registry, _) = service(10);
        registry.insert_topic(record("orders", "dev", "payments"));

        let page = service
            .list_topics("payments", None, PageRequest::first())
            .unwrap();
        assert_eq!(page.entries[0].pending_sequence, 0);
    }
}
