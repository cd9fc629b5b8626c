//! Sidebar navigation derived from the rule set

use serde::Serialize;
use std::collections::BTreeMap;

use crate::{
    models::{Action, ActionSet, Principal, Resource, Role},
    policy::{allowed_actions, evaluate_resource},
    rules::RuleSet,
};

/// One sidebar entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavItem {
    pub resource: Resource,
    pub path: &'static str,
    pub label: &'static str,
}

impl NavItem {
    /// Entry for `resource` as shown to `principal`
    pub fn for_principal(resource: Resource, principal: &Principal) -> Self {
        Self {
            resource,
            path: path(resource),
            label: label(resource, principal.role()),
        }
    }
}

fn path(resource: Resource) -> &'static str {
    match resource {
        Resource::Dashboard => "/dashboard",
        Resource::Users => "/users",
        Resource::AccessControl => "/access-control",
        Resource::Visitors => "/visitors",
        Resource::Analytics => "/analytics",
        Resource::Settings => "/settings",
    }
}

fn label(resource: Resource, role: Role) -> &'static str {
    match (resource, role) {
        (Resource::Users, Role::Company) => "Receptionists",
        (Resource::Users, _) => "Users",
        (Resource::Dashboard, _) => "Dashboard",
        (Resource::AccessControl, _) => "Access Control",
        (Resource::Visitors, _) => "Visitors",
        (Resource::Analytics, _) => "Analytics",
        (Resource::Settings, _) => "Settings",
    }
}

/// Sidebar entries `principal` may read, in sidebar order
pub fn visible_nav(principal: &Principal, rules: &RuleSet) -> Vec<NavItem> {
    Resource::ALL
        .into_iter()
        .filter(|resource| evaluate_resource(principal, *resource, Action::Read, rules))
        .map(|resource| NavItem::for_principal(resource, principal))
        .collect()
}

/// Everything a screen needs to render for one principal, computed from a
/// single rule snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScreenAccess {
    pub principal: Principal,
    pub nav: Vec<NavItem>,
    pub actions: BTreeMap<Resource, ActionSet>,
}

impl ScreenAccess {
    pub fn compute(principal: &Principal, rules: &RuleSet) -> Self {
        let actions = Resource::ALL
            .into_iter()
            .map(|resource| (resource, allowed_actions(principal, resource, rules)))
            .filter(|(_, actions)| !actions.is_empty())
            .collect();

        Self {
            principal: principal.clone(),
            nav: visible_nav(principal, rules),
            actions,
        }
    }

    pub fn can(&self, resource: Resource, action: Action) -> bool {
        self.actions
            .get(&resource)
            .is_some_and(|actions| actions.contains(action))
    }

    pub fn paths(&self) -> Vec<&'static str> {
        self.nav.iter().map(|item| item.path).collect()
    }
}
