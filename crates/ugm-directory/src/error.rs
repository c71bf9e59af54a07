//! Directory Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("No such object: {dn}")]
    NoSuchObject { dn: String },

    #[error("Entry already exists: {dn}")]
    AlreadyExists { dn: String },

    #[error("Invalid credentials for {dn}")]
    InvalidCredentials { dn: String },

    #[error("Invalid filter '{filter}': {message}")]
    InvalidFilter { filter: String, message: String },

    #[error("Invalid DN '{dn}': {message}")]
    InvalidDn { dn: String, message: String },

    #[error("Invalid paging cookie: {cookie}")]
    InvalidCookie { cookie: String },

    #[error("Directory operation on {dn} failed (rc={rc}): {message}")]
    Operation { dn: String, rc: u32, message: String },

    #[error("LDAP error: {0}")]
    Ldap(#[from] ldap3::LdapError),
}

impl DirectoryError {
    pub fn no_such_object(dn: impl Into<String>) -> Self {
        Self::NoSuchObject { dn: dn.into() }
    }

    pub fn already_exists(dn: impl Into<String>) -> Self {
        Self::AlreadyExists { dn: dn.into() }
    }

    pub fn invalid_filter(filter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidFilter {
            filter: filter.into(),
            message: message.into(),
        }
    }

    pub fn invalid_dn(dn: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidDn {
            dn: dn.into(),
            message: message.into(),
        }
    }

    /// True for errors that mean the addressed entry does not exist.
    pub fn is_no_such_object(&self) -> bool {
        matches!(self, Self::NoSuchObject { .. })
    }
}

pub type Result<T> = std::result::Result<T, DirectoryError>;
