//! Data models for the RBAC system

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{RbacError, RbacResult};

/// Account roles. The set is closed; every match on it is exhaustive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Admin,
    Company,
    Receptionist,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Company, Role::Receptionist];

    /// Convert to the wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Company => "company",
            Role::Receptionist => "receptionist",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = RbacError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == normalized)
            .ok_or_else(|| RbacError::validation(format!("unknown role '{}'", value)))
    }
}

/// Protected areas of the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Resource {
    Dashboard,
    Users,
    AccessControl,
    Visitors,
    Analytics,
    Settings,
}

impl Resource {
    /// All resources, in sidebar order
    pub const ALL: [Resource; 6] = [
        Resource::Dashboard,
        Resource::Users,
        Resource::AccessControl,
        Resource::Visitors,
        Resource::Analytics,
        Resource::Settings,
    ];

    /// Convert to the wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Dashboard => "dashboard",
            Resource::Users => "users",
            Resource::AccessControl => "access-control",
            Resource::Visitors => "visitors",
            Resource::Analytics => "analytics",
            Resource::Settings => "settings",
        }
    }

    /// Look up a resource by its wire name. Unknown names yield `None`.
    pub fn lookup(name: &str) -> Option<Resource> {
        let normalized = name.trim().to_ascii_lowercase();
        Resource::ALL
            .into_iter()
            .find(|resource| resource.as_str() == normalized)
    }

    /// Entity kind whose records live behind this resource, if any
    pub fn entity_kind(&self) -> Option<EntityKind> {
        match self {
            Resource::Users => Some(EntityKind::User),
            Resource::Visitors => Some(EntityKind::Visitor),
            Resource::Dashboard
            | Resource::AccessControl
            | Resource::Analytics
            | Resource::Settings => None,
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resource {
    type Err = RbacError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Resource::lookup(value)
            .ok_or_else(|| RbacError::validation(format!("unknown resource '{}'", value)))
    }
}

/// Kinds of tenant-owned domain records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    User,
    Visitor,
}

impl EntityKind {
    pub fn resource(&self) -> Resource {
        match self {
            EntityKind::User => Resource::Users,
            EntityKind::Visitor => Resource::Visitors,
        }
    }
}

/// Action types for permission checking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    Read,
    Write,
}

impl Action {
    pub const ALL: [Action; 2] = [Action::Read, Action::Write];

    /// Convert to string for use in permissions
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Write => "write",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = RbacError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Action::ALL
            .into_iter()
            .find(|action| action.as_str() == normalized)
            .ok_or_else(|| RbacError::validation(format!("unknown action '{}'", value)))
    }
}

/// Unordered set of actions; duplicates collapse on insert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionSet(BTreeSet<Action>);

impl ActionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Action::ALL.into_iter().collect()
    }

    pub fn insert(&mut self, action: Action) -> bool {
        self.0.insert(action)
    }

    pub fn contains(&self, action: Action) -> bool {
        self.0.contains(&action)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Action> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Action> for ActionSet {
    fn from_iter<I: IntoIterator<Item = Action>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for ActionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(|action| action.as_str()).collect();
        f.write_str(&names.join(", "))
    }
}

/// Identifier of a user account (admin, company or receptionist)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// The authenticated actor making a request.
///
/// Fields are private so the ownership invariants hold for every value:
/// a company owns itself, a receptionist always names its company and an
/// admin carries no company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    id: UserId,
    role: Role,
    company_id: Option<UserId>,
}

impl Principal {
    /// Create an admin principal
    pub fn admin(id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            role: Role::Admin,
            company_id: None,
        }
    }

    /// Create a company principal; it owns its own tenant
    pub fn company(id: impl Into<UserId>) -> Self {
        let id = id.into();
        Self {
            company_id: Some(id.clone()),
            id,
            role: Role::Company,
        }
    }

    /// Create a receptionist principal belonging to `company_id`
    pub fn receptionist(id: impl Into<UserId>, company_id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            role: Role::Receptionist,
            company_id: Some(company_id.into()),
        }
    }

    /// Build a principal from its parts, enforcing the ownership invariants
    pub fn from_parts(id: UserId, role: Role, company_id: Option<UserId>) -> RbacResult<Self> {
        match role {
            Role::Admin => Ok(Self::admin(id)),
            Role::Company => match company_id {
                Some(company) if company != id => Err(RbacError::validation(format!(
                    "company account {} cannot belong to company {}",
                    id, company
                ))),
                _ => Ok(Self::company(id)),
            },
            Role::Receptionist => match company_id {
                Some(company) => Ok(Self::receptionist(id, company)),
                None => Err(RbacError::validation(format!(
                    "receptionist {} has no owning company",
                    id
                ))),
            },
        }
    }

    pub fn id(&self) -> &UserId {
        &self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Owning company; for a company this is its own id, for an admin `None`
    pub fn company_id(&self) -> Option<&UserId> {
        self.company_id.as_ref()
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Server-assigned rule identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(Uuid);

impl RuleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RuleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RuleId {
    type Err = RbacError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(value.trim())
            .map(Self)
            .map_err(|_| RbacError::validation(format!("invalid rule id '{}'", value)))
    }
}

/// Lookup key for rules; at most one rule exists per key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleKey {
    pub role: Role,
    pub resource: Resource,
}

impl RuleKey {
    pub fn new(role: Role, resource: Resource) -> Self {
        Self { role, resource }
    }
}

/// A stored grant of actions to a role over a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub role: Role,
    pub resource: Resource,
    pub actions: ActionSet,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Rule {
    pub fn key(&self) -> RuleKey {
        RuleKey::new(self.role, self.resource)
    }

    pub fn allows(&self, action: Action) -> bool {
        self.actions.contains(action)
    }
}

/// Rule contents before the store assigns an id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRule {
    pub role: Role,
    pub resource: Resource,
    pub actions: ActionSet,
}

impl NewRule {
    pub fn new(role: Role, resource: Resource, actions: impl IntoIterator<Item = Action>) -> Self {
        Self {
            role,
            resource,
            actions: actions.into_iter().collect(),
        }
    }

    /// Reject rules that could never grant anything
    pub fn validate(&self) -> RbacResult<()> {
        if self.actions.is_empty() {
            return Err(RbacError::validation(format!(
                "rule for {} on {} must grant at least one action",
                self.role, self.resource
            )));
        }
        Ok(())
    }

    pub fn key(&self) -> RuleKey {
        RuleKey::new(self.role, self.resource)
    }

    /// Materialize into a rule with a fresh id
    pub fn into_rule(self) -> Rule {
        let now = Utc::now();
        Rule {
            id: RuleId::new(),
            role: self.role,
            resource: self.resource,
            actions: self.actions,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update for an existing rule
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulePatch {
    pub role: Option<Role>,
    pub resource: Option<Resource>,
    pub actions: Option<ActionSet>,
}

impl RulePatch {
    pub fn actions(actions: impl IntoIterator<Item = Action>) -> Self {
        Self {
            actions: Some(actions.into_iter().collect()),
            ..Default::default()
        }
    }

    /// Produce the patched rule; the result is validated like a new rule
    pub fn apply_to(&self, rule: &Rule) -> RbacResult<Rule> {
        let candidate = NewRule {
            role: self.role.unwrap_or(rule.role),
            resource: self.resource.unwrap_or(rule.resource),
            actions: self.actions.clone().unwrap_or_else(|| rule.actions.clone()),
        };
        candidate.validate()?;

        Ok(Rule {
            id: rule.id,
            role: candidate.role,
            resource: candidate.resource,
            actions: candidate.actions,
            created_at: rule.created_at,
            updated_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_wire_names() {
        assert_eq!(Resource::AccessControl.as_str(), "access-control");
        assert_eq!(Resource::lookup("Access-Control"), Some(Resource::AccessControl));
        assert_eq!(Resource::lookup("billing"), None);
        assert!("billing".parse::<Resource>().is_err());

        let json = serde_json::to_string(&Resource::AccessControl).unwrap();
        assert_eq!(json, "\"access-control\"");
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("Receptionist".parse::<Role>().unwrap(), Role::Receptionist);
        assert!("superuser".parse::<Role>().is_err());
    }

    #[test]
    fn test_action_set_collapses_duplicates() {
        let set: ActionSet = vec![Action::Read, Action::Write, Action::Read].into_iter().collect();
        assert_eq!(set.len(), 2);
        assert!(set.contains(Action::Read));
        assert_eq!(set.to_string(), "read, write");

        let reordered: ActionSet = vec![Action::Write, Action::Read].into_iter().collect();
        assert_eq!(set, reordered);
    }

    #[test]
    fn test_principal_invariants() {
        let company = Principal::company("C1");
        assert_eq!(company.company_id(), Some(&UserId::new("C1")));

        let receptionist = Principal::receptionist("R1", "C1");
        assert_eq!(receptionist.company_id(), Some(&UserId::new("C1")));

        let admin = Principal::from_parts("A1".into(), Role::Admin, Some("C1".into())).unwrap();
        assert_eq!(admin.company_id(), None);

        assert!(Principal::from_parts("R2".into(), Role::Receptionist, None).is_err());
        assert!(Principal::from_parts("C2".into(), Role::Company, Some("C3".into())).is_err());
        assert_eq!(
            Principal::from_parts("C2".into(), Role::Company, None).unwrap(),
            Principal::company("C2")
        );
    }

    #[test]
    fn test_new_rule_requires_actions() {
        let rule = NewRule::new(Role::Company, Resource::Visitors, Vec::new());
        assert!(rule.validate().is_err());

        let rule = NewRule::new(Role::Company, Resource::Visitors, vec![Action::Read]);
        assert!(rule.validate().is_ok());
    }

    #[test]
    fn test_patch_keeps_identity() {
        let rule = NewRule::new(Role::Company, Resource::Visitors, vec![Action::Read]).into_rule();
        let patched = RulePatch::actions(vec![Action::Read, Action::Write])
            .apply_to(&rule)
            .unwrap();

        assert_eq!(patched.id, rule.id);
        assert_eq!(patched.created_at, rule.created_at);
        assert!(patched.allows(Action::Write));

        let emptied = RulePatch::actions(Vec::new()).apply_to(&rule);
        assert!(emptied.is_err());
    }

    #[test]
    fn test_rule_id_parse() {
        let id = RuleId::new();
        assert_eq!(id.to_string().parse::<RuleId>().unwrap(), id);
        assert!("not-a-uuid".parse::<RuleId>().is_err());
    }
}
