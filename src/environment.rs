//! Environment promotion order
//!
//! Environments form a configured total order (e.g. dev -> test -> prod).
//! Topics are born in the first environment and move up one stage at a time;
//! the graph answers "what is the next valid stage" and nothing else.

use crate::config::GovernanceConfig;
use crate::error::{GovernanceError, Result};
use std::collections::HashMap;

/// The next valid step in a topic's promotion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromotionStep {
    /// Promotion may proceed to this environment
    Next(String),
    /// The environment is the last stage; promotion is complete
    Complete,
}

/// Configuration-loaded total order of environments
#[derive(Debug, Clone)]
pub struct EnvironmentGraph {
    /// Environment names in promotion order
    order: Vec<String>,
    /// Name -> position in `order`
    ranks: HashMap<String, usize>,
}

impl EnvironmentGraph {
    /// Build a graph from an ordered list of environment names
    pub fn new<I, S>(environments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let order: Vec<String> = environments.into_iter().map(Into::into).collect();
        if order.is_empty() {
            return Err(GovernanceError::Config(
                "environment order must not be empty".to_string(),
            ));
        }

        let mut ranks = HashMap::with_capacity(order.len());
        for (rank, env) in order.iter().enumerate() {
            if ranks.insert(env.clone(), rank).is_some() {
                return Err(GovernanceError::Config(format!(
                    "duplicate environment '{}' in promotion order",
                    env
                )));
            }
        }

        Ok(Self { order, ranks })
    }

    /// Build a graph from the governance configuration
    pub fn from_config(config: &GovernanceConfig) -> Result<Self> {
        Self::new(config.environments.iter().cloned())
    }

    /// The environment where new topics are created
    pub fn base(&self) -> &str {
        &self.order[0]
    }

    /// All environments in promotion order
    pub fn environments(&self) -> &[String] {
        &self.order
    }

    /// Whether the environment is part of the promotion order
    pub fn contains(&self, env: &str) -> bool {
        self.ranks.contains_key(env)
    }

    /// Position of the environment in the promotion order
    pub fn rank(&self, env: &str) -> Option<usize> {
        self.ranks.get(env).copied()
    }

    /// The next valid promotion step after the given environment.
    ///
    /// Returns `PromotionStep::Complete` when the environment is the last
    /// stage; this is informational, not an error.
    pub fn next_after(&self, env: &str) -> Result<PromotionStep> {
        let rank = self
            .rank(env)
            .ok_or_else(|| GovernanceError::UnknownEnvironment(env.to_string()))?;

        match self.order.get(rank + 1) {
            Some(next) => Ok(PromotionStep::Next(next.clone())),
            None => Ok(PromotionStep::Complete),
        }
    }

    /// Number of environments in the order
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the order is empty (never true for a constructed graph)
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
