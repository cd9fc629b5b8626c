//! Wire representation of access rules
//!
//! Older rule payloads carry a single `action` string instead of an
//! `actions` list. The legacy field is accepted on input, folded into
//! `actions` and never written back out.

use serde::{Deserialize, Serialize};

use crate::{
    error::{RbacError, RbacResult},
    models::{Action, ActionSet, NewRule, Resource, Role, Rule, RulePatch},
};

/// Rule as exchanged with the access-control screen
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDto {
    #[serde(default, alias = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,

    #[serde(default)]
    pub actions: Vec<String>,

    /// Legacy single-action field; input only
    #[serde(default, skip_serializing)]
    pub action: Option<String>,
}

impl RuleDto {
    /// Parse `actions` merged with the legacy `action`. `None` when neither
    /// was sent.
    pub fn parsed_actions(&self) -> RbacResult<Option<ActionSet>> {
        if self.actions.is_empty() && self.action.is_none() {
            return Ok(None);
        }

        self.actions
            .iter()
            .chain(self.action.iter())
            .map(|name| name.parse::<Action>())
            .collect::<RbacResult<ActionSet>>()
            .map(Some)
    }

    /// Convert into a rule to create; role, resource and actions are required
    pub fn to_new_rule(&self) -> RbacResult<NewRule> {
        let role: Role = required(&self.role, "role")?.parse()?;
        let resource: Resource = required(&self.resource, "resource")?.parse()?;
        let actions = self.parsed_actions()?.unwrap_or_default();

        let rule = NewRule {
            role,
            resource,
            actions,
        };
        rule.validate()?;
        Ok(rule)
    }

    /// Convert into a partial update; absent fields are left unchanged
    pub fn to_patch(&self) -> RbacResult<RulePatch> {
        Ok(RulePatch {
            role: self.role.as_deref().map(str::parse).transpose()?,
            resource: self.resource.as_deref().map(str::parse).transpose()?,
            actions: self.parsed_actions()?,
        })
    }
}

fn required<'a>(field: &'a Option<String>, name: &str) -> RbacResult<&'a str> {
    field
        .as_deref()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| RbacError::validation(format!("{} is required", name)))
}

impl From<&Rule> for RuleDto {
    fn from(rule: &Rule) -> Self {
        Self {
            id: Some(rule.id.to_string()),
            role: Some(rule.role.as_str().to_string()),
            resource: Some(rule.resource.as_str().to_string()),
            actions: rule.actions.iter().map(|a| a.as_str().to_string()).collect(),
            action: None,
        }
    }
}

impl From<Rule> for RuleDto {
    fn from(rule: Rule) -> Self {
        Self::from(&rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_action_merged() {
        let dto: RuleDto = serde_json::from_str(
            r#"{"_id":"legacy","role":"Company","resource":"visitors","action":"write"}"#,
        )
        .unwrap();
        let rule = dto.to_new_rule().unwrap();
        assert_eq!(rule.role, Role::Company);
        assert_eq!(rule.actions, [Action::Write].into_iter().collect::<ActionSet>());

        let dto: RuleDto = serde_json::from_str(
            r#"{"role":"company","resource":"visitors","actions":["read"],"action":"write"}"#,
        )
        .unwrap();
        assert_eq!(dto.to_new_rule().unwrap().actions, ActionSet::all());
    }

    #[test]
    fn test_rendered_rule_has_no_legacy_field() {
        let rule = NewRule::new(Role::Receptionist, Resource::AccessControl, vec![Action::Read])
            .into_rule();
        let json = serde_json::to_value(RuleDto::from(&rule)).unwrap();
        assert_eq!(json["resource"], "access-control");
        assert_eq!(json["actions"], serde_json::json!(["read"]));
        assert!(json.get("action").is_none());
        assert_eq!(json["id"], rule.id.to_string());
    }

    #[test]
    fn test_unknown_names_are_validation_errors() {
        let dto = RuleDto {
            role: Some("superuser".to_string()),
            resource: Some("visitors".to_string()),
            actions: vec!["read".to_string()],
            ..Default::default()
        };
        assert!(matches!(dto.to_new_rule(), Err(RbacError::Validation { .. })));

        let dto = RuleDto {
            role: Some("company".to_string()),
            resource: Some("visitors".to_string()),
            actions: vec!["delete".to_string()],
            ..Default::default()
        };
        assert!(matches!(dto.to_new_rule(), Err(RbacError::Validation { .. })));
    }

    #[test]
    fn test_missing_fields_rejected() {
        let dto = RuleDto {
            resource: Some("visitors".to_string()),
            actions: vec!["read".to_string()],
            ..Default::default()
        };
        assert!(dto.to_new_rule().unwrap_err().to_string().contains("role is required"));

        let dto = RuleDto {
            role: Some("company".to_string()),
            resource: Some("visitors".to_string()),
            ..Default::default()
        };
        assert!(matches!(dto.to_new_rule(), Err(RbacError::Validation { .. })));
    }

    #[test]
    fn test_patch_from_partial_dto() {
        let dto = RuleDto {
            actions: vec!["READ".to_string(), "write".to_string()],
            ..Default::default()
        };
        let patch = dto.to_patch().unwrap();
        assert_eq!(patch.role, None);
        assert_eq!(patch.resource, None);
        assert_eq!(patch.actions, Some(ActionSet::all()));

        assert_eq!(RuleDto::default().to_patch().unwrap(), RulePatch::default());
    }
}
