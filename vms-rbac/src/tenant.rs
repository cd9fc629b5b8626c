//! Tenant scoping
//!
//! A tenant is a company together with its receptionists and visitors. The
//! resource store hands back unfiltered collections; the predicates here
//! decide which records a principal may see or touch, and the stamping
//! functions pin the owning company on drafts before they are persisted.

use serde::Serialize;
use tracing::debug;

use crate::{
    error::{RbacError, RbacResult},
    models::{Action, EntityKind, Principal, Role, UserId},
    records::{TenantOwned, UserDraft, VisitorDraft},
};

/// Visibility predicate over tenant-owned records
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "scope", content = "company_id", rename_all = "snake_case")]
pub enum ScopePredicate {
    /// Every record is visible
    All,
    /// Receptionist accounts belonging to the given company
    ReceptionistsOf(UserId),
    /// Records owned by the given company
    OwnedBy(UserId),
    /// No record is visible
    Nothing,
}

impl ScopePredicate {
    pub fn matches<R: TenantOwned>(&self, record: &R) -> bool {
        match self {
            ScopePredicate::All => true,
            ScopePredicate::ReceptionistsOf(company) => {
                record.account_role() == Some(Role::Receptionist)
                    && record.company_id() == Some(company)
            }
            ScopePredicate::OwnedBy(company) => record.company_id() == Some(company),
            ScopePredicate::Nothing => false,
        }
    }

    /// Keep only the matching records, preserving their order
    pub fn filter<R: TenantOwned>(&self, records: Vec<R>) -> Vec<R> {
        records
            .into_iter()
            .filter(|record| self.matches(record))
            .collect()
    }
}

/// Visibility predicate for `principal` over records of `kind`
pub fn scope(principal: &Principal, kind: EntityKind) -> ScopePredicate {
    match (principal.role(), kind) {
        (Role::Admin, _) => ScopePredicate::All,
        (Role::Company, EntityKind::User) => ScopePredicate::ReceptionistsOf(principal.id().clone()),
        (Role::Company, EntityKind::Visitor) => ScopePredicate::OwnedBy(principal.id().clone()),
        (Role::Receptionist, EntityKind::Visitor) => match principal.company_id() {
            Some(company) => ScopePredicate::OwnedBy(company.clone()),
            None => ScopePredicate::Nothing,
        },
        (Role::Receptionist, EntityKind::User) => ScopePredicate::Nothing,
    }
}

/// Filter a fetched collection down to what `principal` may see
pub fn scope_records<R: TenantOwned>(principal: &Principal, records: Vec<R>) -> Vec<R> {
    let predicate = scope(principal, R::KIND);
    let total = records.len();
    let visible = predicate.filter(records);
    debug!(
        principal = %principal.id(),
        kind = ?R::KIND,
        total,
        visible = visible.len(),
        "Applied tenant scope"
    );
    visible
}

/// Drafts whose owning company is pinned by the principal creating them
pub trait OwnedDraft: Sized {
    const KIND: EntityKind;

    fn stamp(self, principal: &Principal) -> RbacResult<Self>;

    /// Company the draft will belong to, if any
    fn owner(&self) -> Option<&UserId>;
}

/// Force the owning reference on a draft. Company and receptionist
/// principals cannot choose another tenant; any client-supplied value is
/// overwritten.
pub fn stamp_owner<D: OwnedDraft>(principal: &Principal, draft: D) -> RbacResult<D> {
    draft.stamp(principal)
}

impl OwnedDraft for UserDraft {
    const KIND: EntityKind = EntityKind::User;

    fn owner(&self) -> Option<&UserId> {
        self.company_id.as_ref()
    }

    fn stamp(mut self, principal: &Principal) -> RbacResult<Self> {
        match principal.role() {
            Role::Admin => match self.role {
                Role::Receptionist => {
                    if self.company_id.is_none() {
                        return Err(RbacError::validation(
                            "a receptionist must be assigned to a company",
                        ));
                    }
                    Ok(self)
                }
                Role::Admin | Role::Company => {
                    self.company_id = None;
                    Ok(self)
                }
            },
            Role::Company => {
                self.role = Role::Receptionist;
                self.company_id = Some(principal.id().clone());
                Ok(self)
            }
            Role::Receptionist => Err(RbacError::permission_denied(
                Action::Write,
                EntityKind::User.resource().as_str(),
            )),
        }
    }
}

impl OwnedDraft for VisitorDraft {
    const KIND: EntityKind = EntityKind::Visitor;

    fn owner(&self) -> Option<&UserId> {
        self.company_id.as_ref()
    }

    fn stamp(mut self, principal: &Principal) -> RbacResult<Self> {
        match principal.role() {
            Role::Admin => {
                if self.company_id.is_none() {
                    return Err(RbacError::validation("a visitor must belong to a company"));
                }
                Ok(self)
            }
            Role::Company | Role::Receptionist => {
                let company = principal.company_id().cloned().ok_or_else(|| {
                    RbacError::validation(format!("principal {} has no company", principal.id()))
                })?;
                self.company_id = Some(company);
                Ok(self)
            }
        }
    }
}
