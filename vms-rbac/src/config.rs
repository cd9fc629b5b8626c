//! Configuration for the RBAC system

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::{
    error::{RbacError, RbacResult},
    models::{Action, NewRule, Resource, Role},
    rules::RuleSet,
};

/// RBAC configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RbacConfig {
    /// Rules loaded into an empty rule store at startup
    pub seed_rules: Vec<RuleDefinition>,

    /// Refresh policy for the cached rule snapshot
    pub snapshot: SnapshotSettings,

    /// Log every authorization decision with its principal and outcome
    pub audit_decisions: bool,
}

impl Default for RbacConfig {
    fn default() -> Self {
        use Action::{Read, Write};

        Self {
            seed_rules: vec![
                RuleDefinition::new(Role::Company, Resource::Dashboard, &[Read]),
                RuleDefinition::new(Role::Company, Resource::Users, &[Read, Write]),
                RuleDefinition::new(Role::Company, Resource::Visitors, &[Read, Write]),
                RuleDefinition::new(Role::Company, Resource::Analytics, &[Read]),
                RuleDefinition::new(Role::Receptionist, Resource::Dashboard, &[Read]),
                RuleDefinition::new(Role::Receptionist, Resource::Visitors, &[Read, Write]),
                RuleDefinition::new(Role::Receptionist, Resource::Analytics, &[Read]),
            ],
            snapshot: SnapshotSettings::default(),
            audit_decisions: false,
        }
    }
}

/// How long a cached rule snapshot may be served
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotSettings {
    /// Interval between background refreshes from the rule repository
    #[serde(with = "serde_duration")]
    pub refresh_interval: Duration,

    /// Age after which the snapshot is no longer trusted
    #[serde(with = "serde_duration")]
    pub max_staleness: Duration,

    /// Bound on every call to the rule repository
    #[serde(with = "serde_duration")]
    pub fetch_timeout: Duration,
}

impl Default for SnapshotSettings {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(30),
            max_staleness: Duration::from_secs(120),
            fetch_timeout: Duration::from_secs(5),
        }
    }
}

/// Rule definition in configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub role: Role,
    pub resource: Resource,
    pub actions: Vec<Action>,
}

impl RuleDefinition {
    pub fn new(role: Role, resource: Resource, actions: &[Action]) -> Self {
        Self {
            role,
            resource,
            actions: actions.to_vec(),
        }
    }

    pub fn to_new_rule(&self) -> NewRule {
        NewRule::new(self.role, self.resource, self.actions.iter().copied())
    }
}

impl RbacConfig {
    /// Parse configuration from YAML text and validate it
    pub fn from_yaml_str(content: &str) -> RbacResult<Self> {
        let config: RbacConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate durations and seed rules
    pub fn validate(&self) -> RbacResult<()> {
        if self.snapshot.refresh_interval.is_zero() {
            return Err(RbacError::invalid_config(
                "snapshot.refresh_interval must be greater than 0",
            ));
        }
        if self.snapshot.fetch_timeout.is_zero() {
            return Err(RbacError::invalid_config(
                "snapshot.fetch_timeout must be greater than 0",
            ));
        }
        if self.snapshot.max_staleness < self.snapshot.refresh_interval {
            return Err(RbacError::invalid_config(format!(
                "snapshot.max_staleness ({}s) must not be shorter than snapshot.refresh_interval ({}s)",
                self.snapshot.max_staleness.as_secs(),
                self.snapshot.refresh_interval.as_secs()
            )));
        }

        self.seed_rule_set().map(|_| ())
    }

    /// Materialize the seed rules, enforcing the same checks as runtime writes
    pub fn seed_rule_set(&self) -> RbacResult<RuleSet> {
        let mut rules = RuleSet::new();
        for definition in &self.seed_rules {
            let new_rule = definition.to_new_rule();
            rules.check_new(&new_rule).map_err(|e| {
                RbacError::invalid_config(format!(
                    "seed rule {} on {}: {}",
                    definition.role, definition.resource, e
                ))
            })?;
            rules.insert(new_rule.into_rule())?;
        }
        Ok(rules)
    }
}

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: "VMS".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> RbacResult<RbacConfig> {
        let content = std::fs::read_to_string(path)?;
        let mut config: RbacConfig = serde_yaml::from_str(&content)?;
        self.apply_env_overrides(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> RbacResult<RbacConfig> {
        let mut config = RbacConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with fallback chain
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> RbacResult<RbacConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    fn apply_env_overrides(&self, config: &mut RbacConfig) -> RbacResult<()> {
        if let Ok(value) = self.get_env_var("RBAC_REFRESH_INTERVAL") {
            config.snapshot.refresh_interval = parse_seconds("RBAC_REFRESH_INTERVAL", &value)?;
        }

        if let Ok(value) = self.get_env_var("RBAC_MAX_STALENESS") {
            config.snapshot.max_staleness = parse_seconds("RBAC_MAX_STALENESS", &value)?;
        }

        if let Ok(value) = self.get_env_var("RBAC_FETCH_TIMEOUT") {
            config.snapshot.fetch_timeout = parse_seconds("RBAC_FETCH_TIMEOUT", &value)?;
        }

        if let Ok(value) = self.get_env_var("RBAC_AUDIT_DECISIONS") {
            config.audit_decisions = value.parse().map_err(|e| {
                RbacError::invalid_config(format!("Invalid RBAC_AUDIT_DECISIONS: {}", e))
            })?;
        }

        Ok(())
    }

    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(format!("{}_{}", self.prefix, name))
    }
}

fn parse_seconds(name: &str, value: &str) -> RbacResult<Duration> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| RbacError::invalid_config(format!("Invalid {}: {}", name, e)))
}

/// Serde helper module for Duration serialization as seconds
mod serde_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let seconds = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(seconds))
    }
}
