//! Role-based access control and tenant scoping for the visitor-management system
//!
//! This crate decides whether a principal may perform an action on a
//! protected resource, and over which records:
//! - Admins are supreme; other roles are governed by one rule per role and resource
//! - Companies and receptionists only see and mutate their own tenant's records
//! - Rules live in a shared, copy-on-write store that can be backed by a remote repository
//! - Screens consume [`Decision`]s from the [`SessionGuard`] instead of re-checking roles

pub mod access_control;
pub mod adapter;
pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod guard;
pub mod models;
pub mod navigation;
pub mod policy;
pub mod records;
pub mod rules;
pub mod store;
pub mod tenant;

pub use access_control::AccessControlService;
pub use adapter::{InMemoryRuleRepository, RuleRepository};
pub use api::RuleDto;
pub use auth::{require_company, verify_principal, Directory, InMemoryDirectory, Session, SessionState};
pub use config::{ConfigLoader, RbacConfig, SnapshotSettings};
pub use error::{ErrorKind, RbacError, RbacResult};
pub use guard::{Decision, DecisionReason, ScreenSession, ScreenState, SessionGuard};
pub use models::{Action, ActionSet, EntityKind, Principal, Resource, Role, Rule, RuleId, UserId};
pub use navigation::{visible_nav, NavItem, ScreenAccess};
pub use policy::PolicyEvaluator;
pub use records::{UserDraft, UserRecord, VisitorDraft, VisitorId, VisitorRecord};
pub use rules::RuleSet;
pub use store::RuleStore;
pub use tenant::{scope, scope_records, stamp_owner, ScopePredicate};
