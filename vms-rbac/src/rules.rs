//! Keyed rule collection
//!
//! `RuleSet` is the plain data structure behind the rule store: rules indexed
//! by id and by `(role, resource)`, plus insertion order for display. It is
//! not shared state on its own; `RuleStore` wraps it in copy-on-write
//! snapshots.

use std::collections::HashMap;

use crate::{
    error::{RbacError, RbacResult},
    models::{Action, ActionSet, NewRule, Resource, Role, Rule, RuleId, RuleKey, RulePatch},
};

#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: HashMap<RuleId, Rule>,
    by_key: HashMap<RuleKey, RuleId>,
    order: Vec<RuleId>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from already-persisted rules, enforcing uniqueness
    pub fn from_rules(rules: impl IntoIterator<Item = Rule>) -> RbacResult<Self> {
        let mut set = Self::new();
        for rule in rules {
            set.insert(rule)?;
        }
        Ok(set)
    }

    /// Check a prospective rule against validation and the uniqueness invariant
    pub fn check_new(&self, rule: &NewRule) -> RbacResult<()> {
        rule.validate()?;
        self.check_vacant(rule.key(), None)
    }

    /// Insert a rule that already carries an id
    pub fn insert(&mut self, rule: Rule) -> RbacResult<()> {
        if rule.actions.is_empty() {
            return Err(RbacError::validation(format!(
                "rule {} grants no actions",
                rule.id
            )));
        }
        if self.rules.contains_key(&rule.id) {
            return Err(RbacError::validation(format!("duplicate rule id {}", rule.id)));
        }
        self.check_vacant(rule.key(), None)?;

        self.by_key.insert(rule.key(), rule.id);
        self.order.push(rule.id);
        self.rules.insert(rule.id, rule);
        Ok(())
    }

    /// Compute the patched version of rule `id` without modifying the set
    pub fn patched(&self, id: RuleId, patch: &RulePatch) -> RbacResult<Rule> {
        let current = self.get(id).ok_or(RbacError::RuleNotFound { rule_id: id })?;
        let updated = patch.apply_to(current)?;
        self.check_vacant(updated.key(), Some(id))?;
        Ok(updated)
    }

    /// Replace an existing rule in place, keeping its display position
    pub fn replace(&mut self, rule: Rule) -> RbacResult<()> {
        let previous_key = self
            .rules
            .get(&rule.id)
            .map(Rule::key)
            .ok_or(RbacError::RuleNotFound { rule_id: rule.id })?;
        self.check_vacant(rule.key(), Some(rule.id))?;

        self.by_key.remove(&previous_key);
        self.by_key.insert(rule.key(), rule.id);
        self.rules.insert(rule.id, rule);
        Ok(())
    }

    /// Remove a rule; removing an absent rule is an error
    pub fn remove(&mut self, id: RuleId) -> RbacResult<Rule> {
        let rule = self
            .rules
            .remove(&id)
            .ok_or(RbacError::RuleNotFound { rule_id: id })?;
        self.by_key.remove(&rule.key());
        self.order.retain(|existing| *existing != id);
        Ok(rule)
    }

    pub fn get(&self, id: RuleId) -> Option<&Rule> {
        self.rules.get(&id)
    }

    /// Keyed lookup used on every authorization check
    pub fn find(&self, role: Role, resource: Resource) -> Option<&Rule> {
        self.by_key
            .get(&RuleKey::new(role, resource))
            .and_then(|id| self.rules.get(id))
    }

    /// Actions granted to `role` on `resource` by the stored rule, if any
    pub fn granted(&self, role: Role, resource: Resource) -> ActionSet {
        self.find(role, resource)
            .map(|rule| rule.actions.clone())
            .unwrap_or_default()
    }

    pub fn allows(&self, role: Role, resource: Resource, action: Action) -> bool {
        self.find(role, resource)
            .map(|rule| rule.allows(action))
            .unwrap_or(false)
    }

    /// Rules in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Rule> + '_ {
        self.order.iter().filter_map(|id| self.rules.get(id))
    }

    pub fn to_vec(&self) -> Vec<Rule> {
        self.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn check_vacant(&self, key: RuleKey, except: Option<RuleId>) -> RbacResult<()> {
        match self.by_key.get(&key) {
            Some(existing) if Some(*existing) != except => Err(RbacError::RuleConflict {
                role: key.role,
                resource: key.resource,
                existing: *existing,
            }),
            _ => Ok(()),
        }
    }
}
