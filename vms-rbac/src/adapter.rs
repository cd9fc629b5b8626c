//! Persistence adapter for access rules
//!
//! The rule store keeps its working set in memory; durable storage lives
//! behind [`RuleRepository`]. Implementations must enforce the
//! one-rule-per-(role, resource) invariant on their own, independently of
//! the in-memory checks.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    error::{RbacError, RbacResult},
    models::{Rule, RuleId},
    rules::RuleSet,
};

/// Durable storage for access rules
#[async_trait]
pub trait RuleRepository: Send + Sync {
    /// Load every stored rule
    async fn load_all(&self) -> RbacResult<Vec<Rule>>;

    /// Persist a new rule; fails with a conflict if its key is taken
    async fn insert(&self, rule: &Rule) -> RbacResult<()>;

    /// Overwrite an existing rule by id
    async fn update(&self, rule: &Rule) -> RbacResult<()>;

    /// Delete a rule by id
    async fn delete(&self, id: RuleId) -> RbacResult<()>;
}

/// Repository backed by process memory
#[derive(Debug, Default)]
pub struct InMemoryRuleRepository {
    rules: RwLock<RuleSet>,
}

impl InMemoryRuleRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a repository pre-populated with rules
    pub fn with_rules(rules: impl IntoIterator<Item = Rule>) -> RbacResult<Self> {
        Ok(Self {
            rules: RwLock::new(RuleSet::from_rules(rules)?),
        })
    }

    pub async fn len(&self) -> usize {
        self.rules.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rules.read().await.is_empty()
    }
}

#[async_trait]
impl RuleRepository for InMemoryRuleRepository {
    async fn load_all(&self) -> RbacResult<Vec<Rule>> {
        Ok(self.rules.read().await.to_vec())
    }

    async fn insert(&self, rule: &Rule) -> RbacResult<()> {
        self.rules.write().await.insert(rule.clone())
    }

    async fn update(&self, rule: &Rule) -> RbacResult<()> {
        let mut rules = self.rules.write().await;
        if rules.get(rule.id).is_none() {
            return Err(RbacError::RuleNotFound { rule_id: rule.id });
        }
        rules.replace(rule.clone())
    }

    async fn delete(&self, id: RuleId) -> RbacResult<()> {
        self.rules.write().await.remove(id).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Action, NewRule, Resource, Role};

    #[tokio::test]
    async fn test_repository_enforces_uniqueness() {
        let repo = InMemoryRuleRepository::new();
        let first = NewRule::new(Role::Company, Resource::Visitors, vec![Action::Read]).into_rule();
        repo.insert(&first).await.unwrap();

        let duplicate =
            NewRule::new(Role::Company, Resource::Visitors, vec![Action::Write]).into_rule();
        let err = repo.insert(&duplicate).await.unwrap_err();
        assert!(matches!(err, RbacError::RuleConflict { .. }));
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn test_repository_update_and_delete() {
        let rule = NewRule::new(Role::Receptionist, Resource::Visitors, vec![Action::Read]).into_rule();
        let repo = InMemoryRuleRepository::with_rules(vec![rule.clone()]).unwrap();

        let mut updated = rule.clone();
        updated.actions = vec![Action::Read, Action::Write].into_iter().collect();
        repo.update(&updated).await.unwrap();
        assert_eq!(repo.load_all().await.unwrap(), vec![updated]);

        repo.delete(rule.id).await.unwrap();
        assert!(repo.is_empty().await);
        assert!(repo.delete(rule.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_repository_update_unknown() {
        let repo = InMemoryRuleRepository::new();
        let rule = NewRule::new(Role::Company, Resource::Users, vec![Action::Read]).into_rule();
        assert!(repo.update(&rule).await.unwrap_err().is_not_found());
    }
}
