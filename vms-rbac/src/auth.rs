//! Session and directory collaborators

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::warn;

use crate::{
    error::{RbacError, RbacResult},
    models::{Principal, Role, UserId},
    records::UserRecord,
};

/// What the session layer knows about the current request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "principal", rename_all = "snake_case")]
pub enum SessionState {
    /// A valid session with its principal
    Active(Principal),
    /// A principal was known but its token is no longer valid
    Expired,
    /// No session at all
    Absent,
}

impl SessionState {
    /// The principal, only while the session is active
    pub fn principal(&self) -> Option<&Principal> {
        match self {
            SessionState::Active(principal) => Some(principal),
            SessionState::Expired | SessionState::Absent => None,
        }
    }
}

impl From<Option<Principal>> for SessionState {
    fn from(principal: Option<Principal>) -> Self {
        match principal {
            Some(principal) => SessionState::Active(principal),
            None => SessionState::Absent,
        }
    }
}

/// Supplies the authenticated principal before any authorization call
pub trait Session: Send + Sync {
    fn current(&self) -> SessionState;
}

impl Session for SessionState {
    fn current(&self) -> SessionState {
        self.clone()
    }
}

/// Read access to user and company accounts
#[async_trait]
pub trait Directory: Send + Sync {
    async fn find_user(&self, id: &UserId) -> RbacResult<Option<UserRecord>>;
}

impl Principal {
    /// Normalize a directory record into a principal.
    ///
    /// A company always owns itself and an admin never carries a company,
    /// whatever the record says. A receptionist without a company is rejected.
    pub fn from_record(record: &UserRecord) -> RbacResult<Self> {
        match record.role {
            Role::Admin => Ok(Principal::admin(record.id.clone())),
            Role::Company => Ok(Principal::company(record.id.clone())),
            Role::Receptionist => {
                Principal::from_parts(record.id.clone(), record.role, record.company_id.clone())
            }
        }
    }
}

/// Check a principal against the directory.
///
/// A principal that no longer matches its directory record is stale and
/// surfaces as `SessionExpired`. A receptionist's company must also exist as
/// a company account.
pub async fn verify_principal(directory: &dyn Directory, principal: &Principal) -> RbacResult<()> {
    let Some(record) = directory.find_user(principal.id()).await? else {
        warn!(principal = %principal.id(), "Principal no longer exists in the directory");
        return Err(RbacError::SessionExpired);
    };

    if record.role != principal.role() {
        warn!(
            principal = %principal.id(),
            claimed = %principal.role(),
            actual = %record.role,
            "Principal role changed in the directory"
        );
        return Err(RbacError::SessionExpired);
    }

    if principal.role() == Role::Receptionist {
        if record.company_id.as_ref() != principal.company_id() {
            warn!(
                principal = %principal.id(),
                claimed = ?principal.company_id(),
                actual = ?record.company_id,
                "Receptionist company differs from the directory"
            );
            return Err(RbacError::SessionExpired);
        }

        let company_id = principal.company_id().ok_or_else(|| {
            RbacError::validation(format!("receptionist {} has no owning company", principal.id()))
        })?;
        require_company(directory, company_id).await?;
    }

    Ok(())
}

/// Look up `id` and require it to be a company account
pub async fn require_company(directory: &dyn Directory, id: &UserId) -> RbacResult<UserRecord> {
    match directory.find_user(id).await? {
        Some(record) if record.role == Role::Company => Ok(record),
        Some(other) => {
            warn!(account = %id, role = %other.role, "Company reference points at a non-company account");
            Err(RbacError::validation(format!("{} is not a company", id)))
        }
        None => Err(RbacError::validation(format!("unknown company {}", id))),
    }
}

/// Directory held in process memory
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    users: RwLock<HashMap<UserId, UserRecord>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: impl IntoIterator<Item = UserRecord>) -> Self {
        Self {
            users: RwLock::new(users.into_iter().map(|u| (u.id.clone(), u)).collect()),
        }
    }

    /// Add or replace a record
    pub async fn put(&self, record: UserRecord) {
        self.users.write().await.insert(record.id.clone(), record);
    }

    /// Every record, in no particular order
    pub async fn all(&self) -> Vec<UserRecord> {
        self.users.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn find_user(&self, id: &UserId) -> RbacResult<Option<UserRecord>> {
        Ok(self.users.read().await.get(id).cloned())
    }
}
