//! UGM Core
//!
//! Users, groups and roles as principals over directory entries.
//!
//! - `principal`: aliased attributes, store configuration and the generic
//!   `Principals` store with its id cache and staged writes
//! - `user`: users, authentication and password changes
//! - `group`: groups and membership encodings
//! - `role`: roles holding users and groups
//! - `ugm`: the orchestrator tying the stores together
//!
//! Nothing is written to the directory until a store, a principal or the
//! `Ugm` is persisted.

pub mod group;
pub mod principal;
pub mod role;
pub mod shared;
pub mod ugm;
pub mod user;

pub use group::{Group, Groups, MemberFormat, Membership};
pub use principal::{
    AliasedAttributes, AnyPrincipal, DefaultValue, PrincipalEntry, PrincipalKind, PrincipalStore, PrincipalType,
    Principals, PrincipalsConfig, SearchQuery, SecondaryPassword,
};
pub use role::{Role, Roles};
pub use shared::{Result, UgmError};
pub use ugm::{RoleMember, Ugm, GROUP_PREFIX};
pub use user::{User, Users};
