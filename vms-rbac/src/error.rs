//! Error types for RBAC operations

use thiserror::Error;

use crate::models::{Action, Resource, Role, RuleId};

/// Result type for RBAC operations
pub type RbacResult<T> = Result<T, RbacError>;

/// RBAC-specific errors
#[derive(Error, Debug)]
pub enum RbacError {
    /// No principal is attached to the request
    #[error("Authentication required")]
    Unauthenticated,

    /// The principal was known but its session is no longer valid
    #[error("Session expired")]
    SessionExpired,

    /// Permission denied
    #[error("Permission denied: {action} on {resource}")]
    PermissionDenied { action: String, resource: String },

    /// A rule already governs this role/resource pair
    #[error("A rule already exists for role {role} on resource {resource} ({existing})")]
    RuleConflict {
        role: Role,
        resource: Resource,
        existing: RuleId,
    },

    /// Rule not found
    #[error("Rule not found: {rule_id}")]
    RuleNotFound { rule_id: RuleId },

    /// Input failed validation
    #[error("Validation failed: {message}")]
    Validation { message: String },

    /// Remote rule backend could not be reached
    #[error("Rule backend unavailable: {message}")]
    Backend { message: String },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Failed to read a configuration file
    #[error("Failed to read config file: {0}")]
    ConfigRead(#[from] std::io::Error),

    /// Failed to parse a configuration file
    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] serde_yaml::Error),
}

/// Error categories surfaced at the screen boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Unauthenticated,
    Forbidden,
    Conflict,
    NotFound,
    Validation,
    Unavailable,
    Configuration,
}

impl RbacError {
    /// Create a new permission denied error
    pub fn permission_denied(action: Action, resource: impl Into<String>) -> Self {
        Self::PermissionDenied {
            action: action.as_str().to_string(),
            resource: resource.into(),
        }
    }

    /// Create a new validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a new backend error
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Create a new invalid config error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthenticated | Self::SessionExpired => ErrorKind::Unauthenticated,
            Self::PermissionDenied { .. } => ErrorKind::Forbidden,
            Self::RuleConflict { .. } => ErrorKind::Conflict,
            Self::RuleNotFound { .. } => ErrorKind::NotFound,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Backend { .. } => ErrorKind::Unavailable,
            Self::InvalidConfig { .. } | Self::ConfigRead(_) | Self::ConfigParse(_) => {
                ErrorKind::Configuration
            }
        }
    }

    /// Check if this is a permission denied error
    pub fn is_permission_denied(&self) -> bool {
        self.kind() == ErrorKind::Forbidden
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Only authentication failures have a global effect (forced logout);
    /// every other error is local to the attempted operation.
    pub fn requires_logout(&self) -> bool {
        self.kind() == ErrorKind::Unauthenticated
    }

    /// Message suitable for showing to the person at the screen.
    ///
    /// Denials never mention which rule would have allowed the action.
    pub fn user_message(&self) -> String {
        match self.kind() {
            ErrorKind::Unauthenticated => "Your session has ended. Please log in again.".to_string(),
            ErrorKind::Forbidden => "You are not permitted to perform this action.".to_string(),
            ErrorKind::Conflict => {
                "A rule already exists for this role and resource; edit it instead.".to_string()
            }
            ErrorKind::NotFound => {
                "This item no longer exists. Refresh the page to see the latest data.".to_string()
            }
            ErrorKind::Validation => self.to_string(),
            ErrorKind::Unavailable => {
                "Access rules are temporarily unavailable. Please try again.".to_string()
            }
            ErrorKind::Configuration => "The access-control configuration is invalid.".to_string(),
        }
    }
}
