//! Configuration for the governance core
//!
//! Governance behaviour is driven by a small configuration value: the ordered
//! environment list (the promotion order), visibility page size, admin teams,
//! and an optional data directory for snapshot persistence and the audit log.

use crate::error::{GovernanceError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Default promotion order when none is configured
pub const DEFAULT_ENVIRONMENTS: &[&str] = &["dev", "test", "prod"];

/// Default number of entries per visibility page
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Default partition count for topics created without one
pub const DEFAULT_PARTITIONS: i32 = 1;

/// Default replication factor for topics created without one
pub const DEFAULT_REPLICATION_FACTOR: i16 = 1;

/// Governance core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernanceConfig {
    /// Environment names in promotion order (first entry is where topics are born)
    pub environments: Vec<String>,

    /// Number of entries per visibility page
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Teams that may view all topics regardless of membership
    #[serde(default)]
    pub admin_teams: BTreeSet<String>,

    /// Data directory for ledger/registry snapshots and the audit log
    /// (None = in-memory only)
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Partition count applied when a create request does not specify one
    #[serde(default = "default_partitions")]
    pub default_partitions: i32,

    /// Replication factor applied when a create request does not specify one
    #[serde(default = "default_replication_factor")]
    pub default_replication_factor: i16,
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_partitions() -> i32 {
    DEFAULT_PARTITIONS
}

fn default_replication_factor() -> i16 {
    DEFAULT_REPLICATION_FACTOR
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            environments: DEFAULT_ENVIRONMENTS.iter().map(|e| e.to_string()).collect(),
            page_size: DEFAULT_PAGE_SIZE,
            admin_teams: BTreeSet::new(),
            data_dir: None,
            default_partitions: DEFAULT_PARTITIONS,
            default_replication_factor: DEFAULT_REPLICATION_FACTOR,
        }
    }
}

impl GovernanceConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            GovernanceError::Config(format!("failed to read config file: {}", e))
        })?;

        let config: GovernanceConfig = serde_yaml::from_str(&content)
            .map_err(|e| GovernanceError::Config(format!("failed to parse config file: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Set the environment promotion order
    pub fn with_environments<I, S>(mut self, environments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.environments = environments.into_iter().map(Into::into).collect();
        self
    }

    /// Set the visibility page size
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Add an admin team
    pub fn with_admin_team(mut self, team: impl Into<String>) -> Self {
        self.admin_teams.insert(team.into());
        self
    }

    /// Set the data directory for persistence
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(data_dir.into());
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.environments.is_empty() {
            return Err(GovernanceError::Config(
                "at least one environment is required".to_string(),
            ));
        }

        let mut seen = BTreeSet::new();
        for env in &self.environments {
            if env.is_empty() {
                return Err(GovernanceError::Config(
                    "environment names must not be empty".to_string(),
                ));
            }
            if !seen.insert(env.as_str()) {
                return Err(GovernanceError::Config(format!(
                    "duplicate environment '{}' in promotion order",
                    env
                )));
            }
        }

        if self.page_size == 0 {
            return Err(GovernanceError::Config(
                "page_size must be at least 1".to_string(),
            ));
        }

        if self.default_partitions < 1 {
            return Err(GovernanceError::Config(
                "default_partitions must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = GovernanceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.environments, vec!["dev", "test", "prod"]);
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_validate_rejects_empty_environments() {
        let config = GovernanceConfig::default().with_environments(Vec::<String>::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_environments() {
        let config = GovernanceConfig::default().with_environments(["dev", "test", "dev"]);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate environment"));
    }

    #[test]
    fn test_validate_rejects_zero_page_size() {
        let config = GovernanceConfig::default().with_page_size(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "environments: [dev, staging, prod]\npage_size: 5\nadmin_teams: [platform]"
        )
        .unwrap();

        let config = GovernanceConfig::from_file(file.path()).unwrap();
        assert_eq!(config.environments, vec!["dev", "staging", "prod"]);
        assert_eq!(config.page_size, 5);
        assert!(config.admin_teams.contains("platform"));
        assert_eq!(config.default_partitions, DEFAULT_PARTITIONS);
    }

    #[test]
    fn test_from_file_rejects_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "environments: []").unwrap();
        assert!(GovernanceConfig::from_file(file.path()).is_err());
    }
}
