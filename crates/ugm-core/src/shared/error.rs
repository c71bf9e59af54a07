//! UGM Error Types

use thiserror::Error;
use ugm_config::ConfigError;
use ugm_directory::DirectoryError;

use crate::principal::PrincipalType;

#[derive(Error, Debug)]
pub enum UgmError {
    #[error("Unknown attribute alias '{alias}'")]
    UnknownAlias { alias: String },

    #[error("Integrity violation: {attribute} '{value}' is not unique")]
    Integrity { attribute: String, value: String },

    #[error("{principal_type} not found: {id}")]
    NotFound { principal_type: PrincipalType, id: String },

    #[error("No principal with DN '{dn}'")]
    DnNotFound { dn: String },

    #[error("Principal with id '{id}' already exists.")]
    AlreadyExists { id: String },

    #[error("Given value not instance of '{expected}'")]
    TypeMismatch { expected: PrincipalType },

    #[error("Principal already has role '{role}'")]
    RoleAlreadyGranted { role: String },

    #[error("Role not exists '{role}'")]
    RoleNotFound { role: String },

    #[error("Principal does not have role '{role}'")]
    RoleNotGranted { role: String },

    #[error("Role support not configured properly")]
    RolesNotConfigured,

    #[error("Member not found: {member}")]
    MemberNotFound { member: String },

    #[error("Already a member: {member}")]
    MemberExists { member: String },

    #[error("Unknown format")]
    UnknownFormat { object_class: String },

    #[error("Unknown member attribute")]
    UnknownMemberAttribute { object_class: String },

    #[error("Principal '{id}' is not attached to a UGM instance")]
    Detached { id: String },

    #[error("Attribute alias '{alias}' cannot be changed")]
    ImmutableAttribute { alias: String },

    #[error("Exact match search returned more than one result")]
    AmbiguousMatch,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),
}

impl UgmError {
    pub fn unknown_alias(alias: impl Into<String>) -> Self {
        Self::UnknownAlias { alias: alias.into() }
    }

    pub fn not_found(principal_type: PrincipalType, id: impl Into<String>) -> Self {
        Self::NotFound {
            principal_type,
            id: id.into(),
        }
    }

    pub fn integrity(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Integrity {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn member_not_found(member: impl Into<String>) -> Self {
        Self::MemberNotFound { member: member.into() }
    }

    /// Lookup failures: unknown ids, DNs and members.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::DnNotFound { .. } | Self::MemberNotFound { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, UgmError>;
