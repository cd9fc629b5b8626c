//! Session guard
//!
//! The one entry point screens call. It turns "who is asking" into a
//! [`Decision`] by combining the policy evaluator (may this role act on this
//! resource?) with the tenant scope resolver (over which records?). A
//! missing or expired session is always `Unauthenticated`, never `Forbidden`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::{
    auth::{require_company, Directory, Session, SessionState},
    error::{RbacError, RbacResult},
    models::{Action, Principal, Resource},
    navigation::ScreenAccess,
    policy::PolicyEvaluator,
    records::{TenantOwned, VisitorRecord},
    store::RuleStore,
    tenant::{scope, stamp_owner, OwnedDraft, ScopePredicate},
};

/// Why a decision came out the way it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    Allowed,
    Unauthenticated,
    Forbidden,
}

/// Outcome of one authorization check. Computed fresh on every call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub allowed: bool,
    pub reason: DecisionReason,
    /// Record filter for resources that hold tenant-owned records
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<ScopePredicate>,
}

impl Decision {
    pub fn allow(scope: Option<ScopePredicate>) -> Self {
        Self {
            allowed: true,
            reason: DecisionReason::Allowed,
            scope,
        }
    }

    pub fn unauthenticated() -> Self {
        Self {
            allowed: false,
            reason: DecisionReason::Unauthenticated,
            scope: None,
        }
    }

    pub fn forbidden() -> Self {
        Self {
            allowed: false,
            reason: DecisionReason::Forbidden,
            scope: None,
        }
    }

    /// Convert a denial into the matching error
    pub fn into_result(self, resource: &str, action: Action) -> RbacResult<Option<ScopePredicate>> {
        match self.reason {
            DecisionReason::Allowed => Ok(self.scope),
            DecisionReason::Unauthenticated => Err(RbacError::Unauthenticated),
            DecisionReason::Forbidden => Err(RbacError::permission_denied(action, resource)),
        }
    }
}

/// Per-request authorization front door
#[derive(Clone)]
pub struct SessionGuard {
    evaluator: PolicyEvaluator,
}

impl SessionGuard {
    pub fn new(evaluator: PolicyEvaluator) -> Self {
        Self { evaluator }
    }

    /// Guard over a rule store with decision auditing off
    pub fn from_store(store: RuleStore) -> Self {
        Self::new(PolicyEvaluator::new(store))
    }

    pub fn evaluator(&self) -> &PolicyEvaluator {
        &self.evaluator
    }

    /// Decide whether `principal` may perform `action` on `resource`
    pub async fn authorize(
        &self,
        principal: Option<&Principal>,
        resource: &str,
        action: Action,
    ) -> Decision {
        let Some(principal) = principal else {
            debug!(resource, action = %action, "No principal; unauthenticated");
            return Decision::unauthenticated();
        };

        if !self.evaluator.can(principal, resource, action).await {
            return Decision::forbidden();
        }

        let predicate = Resource::lookup(resource)
            .and_then(|resource| resource.entity_kind())
            .map(|kind| scope(principal, kind));
        Decision::allow(predicate)
    }

    /// Like [`authorize`](Self::authorize), reading the principal from a session.
    /// Expired sessions are treated the same as absent ones.
    pub async fn authorize_session(
        &self,
        session: &dyn Session,
        resource: &str,
        action: Action,
    ) -> Decision {
        match session.current() {
            SessionState::Active(principal) => {
                self.authorize(Some(&principal), resource, action).await
            }
            SessionState::Expired => {
                debug!(resource, "Session expired; unauthenticated");
                Decision::unauthenticated()
            }
            SessionState::Absent => Decision::unauthenticated(),
        }
    }

    /// Authorize or fail with the matching error
    pub async fn require(
        &self,
        principal: Option<&Principal>,
        resource: &str,
        action: Action,
    ) -> RbacResult<Option<ScopePredicate>> {
        self.authorize(principal, resource, action)
            .await
            .into_result(resource, action)
    }

    /// Check read access to the records' resource and filter a fetched
    /// collection down to the principal's scope
    pub async fn scoped<R: TenantOwned>(
        &self,
        principal: Option<&Principal>,
        records: Vec<R>,
    ) -> RbacResult<Vec<R>> {
        let resource = R::KIND.resource();
        let predicate = self
            .require(principal, resource.as_str(), Action::Read)
            .await?
            .unwrap_or(ScopePredicate::Nothing);
        Ok(predicate.filter(records))
    }

    /// Allow a mutation of `record` only with write access to its resource
    /// and the record inside the principal's scope
    pub async fn authorize_mutation<R: TenantOwned>(
        &self,
        principal: &Principal,
        record: &R,
    ) -> RbacResult<()> {
        let resource = R::KIND.resource();
        let predicate = self
            .require(Some(principal), resource.as_str(), Action::Write)
            .await?
            .unwrap_or(ScopePredicate::Nothing);

        if !predicate.matches(record) {
            info!(
                principal = %principal.id(),
                resource = %resource,
                "Rejected mutation of out-of-scope record"
            );
            return Err(RbacError::permission_denied(Action::Write, resource.as_str()));
        }
        Ok(())
    }

    /// Check write access for a new record and stamp its owning company
    pub async fn prepare_draft<D: OwnedDraft>(
        &self,
        principal: &Principal,
        draft: D,
    ) -> RbacResult<D> {
        self.require(Some(principal), D::KIND.resource().as_str(), Action::Write)
            .await?;
        stamp_owner(principal, draft)
    }

    /// Like [`prepare_draft`](Self::prepare_draft), also requiring the
    /// stamped owner to exist in `directory` as a company account
    pub async fn prepare_draft_checked<D: OwnedDraft>(
        &self,
        directory: &dyn Directory,
        principal: &Principal,
        draft: D,
    ) -> RbacResult<D> {
        let draft = self.prepare_draft(principal, draft).await?;
        if let Some(owner) = draft.owner() {
            require_company(directory, owner).await?;
        }
        Ok(draft)
    }

    /// Check a visitor out; the record is untouched unless every check passes
    pub async fn check_out_visitor(
        &self,
        principal: &Principal,
        visitor: &mut VisitorRecord,
        at: DateTime<Utc>,
    ) -> RbacResult<()> {
        self.authorize_mutation(principal, &*visitor).await?;
        visitor.check_out(at)?;
        info!(
            principal = %principal.id(),
            visitor = %visitor.id,
            "Visitor checked out"
        );
        Ok(())
    }

    /// Sidebar and per-resource actions for a principal
    pub async fn screen_access(&self, principal: Option<&Principal>) -> RbacResult<ScreenAccess> {
        let principal = principal.ok_or(RbacError::Unauthenticated)?;
        let rules = self.evaluator.store().snapshot().await;
        Ok(ScreenAccess::compute(principal, &rules))
    }
}

/// Where a screen session stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenState {
    Unauthenticated,
    Authenticated,
    Authorized,
    Forbidden,
}

/// Per-screen session state machine.
///
/// `Unauthenticated -> Authenticated -> {Authorized, Forbidden}`, and back to
/// `Unauthenticated` from anywhere on sign-out or expiry. Every
/// unauthenticated outcome drops the cached principal.
pub struct ScreenSession {
    guard: SessionGuard,
    principal: Option<Principal>,
    state: ScreenState,
}

impl ScreenSession {
    pub fn new(guard: SessionGuard) -> Self {
        Self {
            guard,
            principal: None,
            state: ScreenState::Unauthenticated,
        }
    }

    pub fn state(&self) -> ScreenState {
        self.state
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    pub fn sign_in(&mut self, principal: Principal) {
        debug!(principal = %principal.id(), "Screen session signed in");
        self.principal = Some(principal);
        self.state = ScreenState::Authenticated;
    }

    pub fn sign_out(&mut self) {
        self.principal = None;
        self.state = ScreenState::Unauthenticated;
    }

    pub fn expire(&mut self) {
        if let Some(principal) = self.principal.take() {
            info!(principal = %principal.id(), "Screen session expired");
        }
        self.state = ScreenState::Unauthenticated;
    }

    /// Follow the external session: sign in a new principal, or expire when
    /// the session is no longer active
    pub fn sync(&mut self, session: &dyn Session) {
        match session.current() {
            SessionState::Active(principal) => {
                if self.principal.as_ref() != Some(&principal) {
                    self.sign_in(principal);
                }
            }
            SessionState::Expired | SessionState::Absent => self.expire(),
        }
    }

    /// Run a check and move to the resulting state
    pub async fn check(&mut self, resource: &str, action: Action) -> Decision {
        let decision = self
            .guard
            .authorize(self.principal.as_ref(), resource, action)
            .await;

        self.state = match decision.reason {
            DecisionReason::Allowed => ScreenState::Authorized,
            DecisionReason::Forbidden => ScreenState::Forbidden,
            DecisionReason::Unauthenticated => {
                self.principal = None;
                ScreenState::Unauthenticated
            }
        };
        decision
    }
}
