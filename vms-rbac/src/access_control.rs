//! Rule management for the access-control screen
//!
//! Every operation, listing included, requires `write` on `access-control`
//! before the store is touched. Denied calls leave the rule set unchanged.

use tracing::info;

use crate::{
    api::RuleDto,
    error::RbacResult,
    guard::SessionGuard,
    models::{Action, Principal, Resource, RuleId},
    store::RuleStore,
};

/// Gated CRUD over the rule store
#[derive(Clone)]
pub struct AccessControlService {
    guard: SessionGuard,
    store: RuleStore,
}

impl AccessControlService {
    pub fn new(guard: SessionGuard) -> Self {
        let store = guard.evaluator().store().clone();
        Self { guard, store }
    }

    async fn authorize(&self, principal: Option<&Principal>) -> RbacResult<()> {
        self.guard
            .require(principal, Resource::AccessControl.as_str(), Action::Write)
            .await
            .map(|_| ())
    }

    /// Rules in insertion order
    pub async fn list_rules(&self, principal: Option<&Principal>) -> RbacResult<Vec<RuleDto>> {
        self.authorize(principal).await?;
        Ok(self.store.list().await.iter().map(RuleDto::from).collect())
    }

    /// Create a rule; a second rule for the same role and resource conflicts
    pub async fn upsert_rule(
        &self,
        principal: Option<&Principal>,
        dto: &RuleDto,
    ) -> RbacResult<RuleDto> {
        self.authorize(principal).await?;
        let rule = self.store.upsert(dto.to_new_rule()?).await?;
        info!(
            rule_id = %rule.id,
            role = %rule.role,
            resource = %rule.resource,
            "Rule created via access control"
        );
        Ok(RuleDto::from(rule))
    }

    pub async fn update_rule(
        &self,
        principal: Option<&Principal>,
        id: &str,
        dto: &RuleDto,
    ) -> RbacResult<RuleDto> {
        self.authorize(principal).await?;
        let id: RuleId = id.parse()?;
        let rule = self.store.update(id, dto.to_patch()?).await?;
        Ok(RuleDto::from(rule))
    }

    pub async fn delete_rule(&self, principal: Option<&Principal>, id: &str) -> RbacResult<()> {
        self.authorize(principal).await?;
        let id: RuleId = id.parse()?;
        self.store.remove(id).await.map(|_| ())
    }
}
