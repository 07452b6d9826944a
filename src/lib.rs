#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

//! # streamgov
//!
//! Self-service topic and ACL governance for streaming platforms: teams
//! request topic creation, promotion across environments, and
//! producer/consumer access; requests pass through a human-in-the-loop
//! approval workflow before the change is synchronized to the live cluster.
//!
//! ## Features
//!
//! - **Request lifecycle**: `pending -> {approved, rejected}`,
//!   `approved -> {applied, failed}`, with terminal requests retained as the
//!   audit record
//! - **Team-scoped authorization**: topic ownership and producer/consumer
//!   grants resolved per (topic, environment)
//! - **Promotion ordering**: a configured environment order (dev -> test ->
//!   prod); no stage skipping
//! - **Per-key serialization**: requests for one (topic, environment) are
//!   sequenced and approved in order; independent keys run in parallel
//! - **Team-filtered visibility**: paginated listings showing only what a
//!   team owns, produces to, or consumes from
//! - **Pluggable cluster sync**: the broker wire client stays behind the
//!   [`ClusterSync`] trait
//!
//! ## Example
//!
//! ```no_run
//! use streamgov::{Governance, GovernanceConfig, NewRequest, PageRequest};
//!
//! #[tokio::main]
//! async fn main() -> streamgov::Result<()> {
//!     let governance = Governance::in_memory(GovernanceConfig::default())?;
//!
//!     // A team asks for a topic; another team approves it.
//!     let request = governance
//!         .submit(NewRequest::create_topic("payments", "orders", "dev").with_sizing(6, 3))
//!         .await?;
//!     governance.approve(&request.id, "platform").await?;
//!
//!     // The owning team sees its topic.
//!     let page = governance.list_topics("payments", Some("dev"), PageRequest::first())?;
//!     println!("{} topics visible", page.entries.len());
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`workflow`] - approval workflow engine and keyed per-topic locking
//! - [`team`] - team registry: ownership and producer/consumer relations
//! - [`ledger`] - request ledger with per-key sequence numbering
//! - [`environment`] - configured environment promotion order
//! - [`visibility`] - paginated team-filtered listings
//! - [`sync`] - cluster synchronization capability and in-memory cluster
//! - [`audit`] - JSONL governance audit trail
//! - [`config`] - governance configuration
//! - [`governance`] - embedded facade wiring everything together

pub mod audit;
pub mod config;
pub mod environment;
pub mod error;
pub mod governance;
pub mod ledger;
pub mod sync;
pub mod team;
pub mod visibility;
pub mod workflow;

pub use audit::{AuditLog, AuditRecord, GovernanceEvent};
pub use config::GovernanceConfig;
pub use environment::{EnvironmentGraph, PromotionStep};
pub use error::{GovernanceError, Result};
pub use governance::Governance;
pub use ledger::{Request, RequestKind, RequestLedger, RequestState};
pub use sync::{ClusterChange, ClusterSync, InMemoryCluster, TopicState};
pub use team::{TeamRegistry, TopicKey, TopicRecord};
pub use visibility::{PageRequest, StreamView, VisibilityPage, VisibilityService};
pub use workflow::{ApprovalEngine, NewRequest, SnapshotPaths};
