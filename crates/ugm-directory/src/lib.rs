//! Directory collaborators for the UGM layer
//!
//! - `session`: the async `DirectorySession` trait and search types
//! - `entry`: attribute maps and the dirty-tracking `DirectoryEntry`
//! - `filter`: `ldap3_proto` filters with rendering and in-memory evaluation
//! - `dn`: distinguished name normalization
//! - `memory`: in-memory session
//! - `ldap`: `ldap3` backed session

pub mod dn;
pub mod entry;
pub mod error;
pub mod filter;
pub mod ldap;
pub mod memory;
pub mod session;

pub use entry::{Attributes, DirectoryEntry, EntryState, IntoAttributeValues};
pub use error::{DirectoryError, Result};
pub use filter::Filter;
pub use ldap::{LdapSession, LdapSettings};
pub use memory::MemoryDirectory;
pub use session::{DirectorySession, Modification, Scope, SearchEntry, SearchPage, SearchRequest};
