//! Tenant-owned domain records (users and visitors) and their drafts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::{RbacError, RbacResult},
    models::{EntityKind, Role, UserId},
};

/// Records that belong to a tenant partition
pub trait TenantOwned {
    const KIND: EntityKind;

    /// Owning company reference, if the record carries one
    fn company_id(&self) -> Option<&UserId>;

    /// Role of the record itself; only user accounts have one
    fn account_role(&self) -> Option<Role> {
        None
    }
}

/// A user account as returned by the resource store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<UserId>,
}

impl TenantOwned for UserRecord {
    const KIND: EntityKind = EntityKind::User;

    fn company_id(&self) -> Option<&UserId> {
        self.company_id.as_ref()
    }

    fn account_role(&self) -> Option<Role> {
        Some(self.role)
    }
}

/// A user account about to be created or updated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDraft {
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<UserId>,
}

/// Visitor identifier assigned by the resource store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VisitorId(String);

impl VisitorId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VisitorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A visitor entry as returned by the resource store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitorRecord {
    pub id: VisitorId,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub purpose: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<UserId>,
    pub check_in: DateTime<Utc>,
    #[serde(default)]
    pub check_out: Option<DateTime<Utc>>,
}

impl VisitorRecord {
    pub fn is_checked_out(&self) -> bool {
        self.check_out.is_some()
    }

    /// Record the visitor leaving; a visitor can only check out once
    pub fn check_out(&mut self, at: DateTime<Utc>) -> RbacResult<()> {
        if let Some(previous) = self.check_out {
            return Err(RbacError::validation(format!(
                "visitor {} already checked out at {}",
                self.id,
                previous.to_rfc3339()
            )));
        }
        if at < self.check_in {
            return Err(RbacError::validation(format!(
                "visitor {} cannot check out before checking in",
                self.id
            )));
        }
        self.check_out = Some(at);
        Ok(())
    }
}

impl TenantOwned for VisitorRecord {
    const KIND: EntityKind = EntityKind::Visitor;

    fn company_id(&self) -> Option<&UserId> {
        self.company_id.as_ref()
    }
}

/// A visitor entry about to be created or updated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitorDraft {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub purpose: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<UserId>,
}
