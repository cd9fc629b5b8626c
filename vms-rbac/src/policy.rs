//! Policy evaluation
//!
//! Admins are allowed everything without consulting the rule store. Every
//! other role is allowed an action only when the rule for its
//! `(role, resource)` pair lists that action; a missing rule or an unknown
//! resource name denies. Nothing is memoized: each call reads the current
//! snapshot.

use tracing::debug;

use crate::{
    models::{Action, ActionSet, Principal, Resource, Role},
    rules::RuleSet,
    store::RuleStore,
};

/// Decide whether `principal` may perform `action` on the resource named
/// `resource` under `rules`.
pub fn evaluate(principal: &Principal, resource: &str, action: Action, rules: &RuleSet) -> bool {
    if principal.is_admin() {
        return true;
    }
    match Resource::lookup(resource) {
        Some(resource) => evaluate_resource(principal, resource, action, rules),
        None => false,
    }
}

/// Typed variant of [`evaluate`]
pub fn evaluate_resource(
    principal: &Principal,
    resource: Resource,
    action: Action,
    rules: &RuleSet,
) -> bool {
    match principal.role() {
        Role::Admin => true,
        Role::Company | Role::Receptionist => rules.allows(principal.role(), resource, action),
    }
}

/// Every action `principal` may perform on `resource`
pub fn allowed_actions(principal: &Principal, resource: Resource, rules: &RuleSet) -> ActionSet {
    match principal.role() {
        Role::Admin => ActionSet::all(),
        Role::Company | Role::Receptionist => rules.granted(principal.role(), resource),
    }
}

/// Policy evaluator bound to a rule store
#[derive(Clone)]
pub struct PolicyEvaluator {
    store: RuleStore,
    audit: bool,
}

impl PolicyEvaluator {
    pub fn new(store: RuleStore) -> Self {
        Self {
            store,
            audit: false,
        }
    }

    /// Log each decision at info level instead of debug
    pub fn with_audit(mut self, audit: bool) -> Self {
        self.audit = audit;
        self
    }

    pub fn store(&self) -> &RuleStore {
        &self.store
    }

    /// Check if `principal` may perform `action` on `resource`
    pub async fn can(&self, principal: &Principal, resource: &str, action: Action) -> bool {
        let rules = self.store.snapshot().await;
        let allowed = evaluate(principal, resource, action, &rules);
        self.record(principal, resource, action, allowed);
        allowed
    }

    /// Actions `principal` holds on `resource` under the current rules
    pub async fn allowed_actions(&self, principal: &Principal, resource: Resource) -> ActionSet {
        let rules = self.store.snapshot().await;
        allowed_actions(principal, resource, &rules)
    }

    fn record(&self, principal: &Principal, resource: &str, action: Action, allowed: bool) {
        if self.audit {
            tracing::info!(
                principal = %principal.id(),
                role = %principal.role(),
                resource,
                action = %action,
                allowed,
                "Authorization decision"
            );
        } else {
            debug!(
                principal = %principal.id(),
                role = %principal.role(),
                resource,
                action = %action,
                allowed,
                "Authorization decision"
            );
        }
    }
}
