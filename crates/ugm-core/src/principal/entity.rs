//! Principal entity

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::debug;
use ugm_directory::entry::find_values;
use ugm_directory::{Attributes, DirectoryEntry, DirectorySession, Filter, Scope, SearchRequest};

use crate::group::Group;
use crate::principal::attributes::AliasedAttributes;
use crate::principal::config::PrincipalsConfig;
use crate::role::Role;
use crate::shared::{Result, UgmError};
use crate::ugm::Ugm;
use crate::user::User;

/// Kind of principal a store holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrincipalType {
    User,
    Group,
    Role,
}

impl PrincipalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrincipalType::User => "User",
            PrincipalType::Group => "Group",
            PrincipalType::Role => "Role",
        }
    }
}

impl fmt::Display for PrincipalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State shared by a store and every principal it hands out.
pub(crate) struct StoreContext {
    pub(crate) principal_type: PrincipalType,
    pub(crate) config: PrincipalsConfig,
    pub(crate) session: Arc<dyn DirectorySession>,
    /// Set when the store was built by a `Ugm`.
    pub(crate) owner: Option<Weak<Ugm>>,
}

/// Read access a default-value function gets to the store it runs in.
pub trait PrincipalStore: Send + Sync {
    fn principal_type(&self) -> PrincipalType;

    fn config(&self) -> &PrincipalsConfig;

    /// Ids of the principals currently held in memory.
    fn cached_ids(&self) -> Vec<String>;

    /// Whether any staged creation, deletion or attribute edit is pending.
    fn changed(&self) -> bool;
}

/// One directory entry viewed as a principal.
pub struct PrincipalEntry {
    id: String,
    node: RwLock<DirectoryEntry>,
    context: Arc<StoreContext>,
}

impl PrincipalEntry {
    pub(crate) fn new(id: impl Into<String>, node: DirectoryEntry, context: Arc<StoreContext>) -> Self {
        Self {
            id: id.into(),
            node: RwLock::new(node),
            context,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn principal_type(&self) -> PrincipalType {
        self.context.principal_type
    }

    pub fn dn(&self) -> String {
        self.node.read().dn().to_string()
    }

    /// Aliased attribute view.
    pub fn attrs(&self) -> AliasedAttributes<'_> {
        AliasedAttributes::new(self)
    }

    /// All attributes of the underlying entry, mapped or not.
    pub fn directory_attributes(&self) -> Attributes {
        self.node.read().attributes().clone()
    }

    /// True for staged creations and for entries with unsaved edits.
    pub fn changed(&self) -> bool {
        self.node.read().changed()
    }

    /// True until the entry has been written to the directory.
    pub fn is_new(&self) -> bool {
        self.node.read().is_new()
    }

    pub fn config(&self) -> &PrincipalsConfig {
        &self.context.config
    }

    /// The owning `Ugm`, or `Detached` for standalone stores.
    pub fn ugm(&self) -> Result<Arc<Ugm>> {
        self.context
            .owner
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or_else(|| UgmError::Detached { id: self.id.clone() })
    }

    pub(crate) fn session(&self) -> &dyn DirectorySession {
        self.context.session.as_ref()
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&DirectoryEntry) -> R) -> R {
        f(&self.node.read())
    }

    pub(crate) fn write<R>(&self, f: impl FnOnce(&mut DirectoryEntry) -> R) -> R {
        f(&mut self.node.write())
    }

    /// Write this entry to the directory: an add for staged creations, a
    /// modify carrying the changed attributes otherwise.
    pub async fn persist(&self) -> Result<()> {
        let (dn, is_new, attrs, changes) = self.read(|node| {
            (
                node.dn().to_string(),
                node.is_new(),
                node.attributes().clone(),
                node.modifications(),
            )
        });

        if is_new {
            self.session().add(&dn, &attrs).await?;
            debug!(id = %self.id, %dn, "Added principal entry");
        } else if changes.is_empty() {
            return Ok(());
        } else {
            self.session().modify(&dn, &changes).await?;
            debug!(id = %self.id, %dn, changes = changes.len(), "Modified principal entry");
        }

        self.write(|node| node.commit(attrs));
        Ok(())
    }

    /// Discard local edits and re-read the entry from the directory.
    pub async fn reload(&self) -> Result<()> {
        if self.is_new() {
            return Err(UgmError::validation(format!(
                "{} '{}' has not been persisted yet",
                self.principal_type(),
                self.id
            )));
        }

        let dn = self.dn();
        let request = SearchRequest::new(dn.clone(), Scope::Base, Filter::everything());
        let entry = self
            .session()
            .search(&request)
            .await?
            .entries
            .into_iter()
            .next()
            .ok_or(UgmError::DnNotFound { dn })?;

        self.write(|node| node.reset(entry.attrs));
        Ok(())
    }

    /// Re-read `names` from the directory without touching other edits.
    pub(crate) async fn refresh_attributes(&self, names: &[String]) -> Result<()> {
        let dn = self.dn();
        let request = SearchRequest::new(dn.clone(), Scope::Base, Filter::everything())
            .with_attributes(names.iter().cloned());
        let entry = self
            .session()
            .search(&request)
            .await?
            .entries
            .into_iter()
            .next()
            .ok_or(UgmError::DnNotFound { dn })?;

        self.write(|node| {
            for name in names {
                let values = find_values(&entry.attrs, name).cloned().unwrap_or_default();
                node.refresh(name, values);
            }
        });
        Ok(())
    }
}

impl fmt::Debug for PrincipalEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let node = self.node.read();
        f.debug_struct(self.context.principal_type.as_str())
            .field("id", &self.id)
            .field("dn", &node.dn())
            .field("changed", &node.changed())
            .finish()
    }
}

/// Glue between a store and the principal type it hands out.
pub trait PrincipalKind: fmt::Debug + Send + Sync + Sized + 'static {
    const TYPE: PrincipalType;

    fn from_entry(entry: PrincipalEntry) -> Self;

    fn entry(&self) -> &PrincipalEntry;

    fn into_any(principal: Arc<Self>) -> AnyPrincipal;

    /// Gives the value back when it holds another principal type.
    fn from_any(principal: AnyPrincipal) -> std::result::Result<Arc<Self>, AnyPrincipal>;

    /// Adjust a freshly built entry before it is staged.
    fn prepare(_node: &mut DirectoryEntry) -> Result<()> {
        Ok(())
    }
}

/// A principal of any type.
#[derive(Debug, Clone)]
pub enum AnyPrincipal {
    User(Arc<User>),
    Group(Arc<Group>),
    Role(Arc<Role>),
}

impl AnyPrincipal {
    pub fn entry(&self) -> &PrincipalEntry {
        match self {
            AnyPrincipal::User(user) => user.entry(),
            AnyPrincipal::Group(group) => group.entry(),
            AnyPrincipal::Role(role) => role.entry(),
        }
    }

    pub fn id(&self) -> &str {
        self.entry().id()
    }

    pub fn principal_type(&self) -> PrincipalType {
        match self {
            AnyPrincipal::User(_) => PrincipalType::User,
            AnyPrincipal::Group(_) => PrincipalType::Group,
            AnyPrincipal::Role(_) => PrincipalType::Role,
        }
    }

    pub fn as_user(&self) -> Option<&Arc<User>> {
        match self {
            AnyPrincipal::User(user) => Some(user),
            _ => None,
        }
    }

    pub fn as_group(&self) -> Option<&Arc<Group>> {
        match self {
            AnyPrincipal::Group(group) => Some(group),
            _ => None,
        }
    }
}

impl From<Arc<User>> for AnyPrincipal {
    fn from(user: Arc<User>) -> Self {
        AnyPrincipal::User(user)
    }
}

impl From<Arc<Group>> for AnyPrincipal {
    fn from(group: Arc<Group>) -> Self {
        AnyPrincipal::Group(group)
    }
}

impl From<Arc<Role>> for AnyPrincipal {
    fn from(role: Arc<Role>) -> Self {
        AnyPrincipal::Role(role)
    }
}
