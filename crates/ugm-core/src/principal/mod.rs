//! Principal building blocks shared by users, groups and roles

pub mod attributes;
pub mod config;
pub mod entity;
pub mod repository;
pub mod search;

pub use attributes::AliasedAttributes;
pub use config::{DefaultFn, DefaultValue, PrincipalsConfig, SecondaryPassword, ID_ALIAS, LOGIN_ALIAS, RDN_ALIAS};
pub use entity::{AnyPrincipal, PrincipalEntry, PrincipalKind, PrincipalStore, PrincipalType};
pub use repository::{AliasedValues, Principals};
pub use search::SearchQuery;
