//! User principal

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use tracing::{debug, info};
use ugm_directory::{DirectoryError, Modification};

use crate::group::Group;
use crate::principal::{AnyPrincipal, PrincipalEntry, PrincipalKind, PrincipalType};
use crate::shared::{Result, UgmError};
use crate::ugm::RoleMember;

/// Directory attribute holding the primary password.
pub const PASSWORD_ATTRIBUTE: &str = "userPassword";

pub struct User(PrincipalEntry);

impl User {
    /// Value of the login attribute; the id when no login alias is mapped.
    pub fn login(&self) -> Option<String> {
        let attr = self.config().login_attr().unwrap_or(self.config().id_attr()).to_string();
        self.read(|node| node.first(&attr).map(str::to_string))
    }

    /// Check `password` by binding as this user. Unsaved users never
    /// authenticate.
    pub async fn authenticate(&self, password: &str) -> Result<bool> {
        if self.is_new() {
            return Ok(false);
        }
        match self.session().bind(&self.dn(), password).await {
            Ok(authenticated) => Ok(authenticated),
            Err(DirectoryError::NoSuchObject { .. }) | Err(DirectoryError::InvalidCredentials { .. }) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Change the password. `old` is verified by the directory; configured
    /// secondary password attributes are derived from `new` and written with
    /// the same operation. The cached password attributes are re-read
    /// afterwards, other pending edits are kept.
    pub async fn passwd(&self, old: &str, new: &str) -> Result<()> {
        let secondary = &self.config().secondary_passwords;
        let derived: Vec<Modification> = secondary
            .iter()
            .map(|password| Modification::Replace(password.attribute.clone(), vec![(password.derive)(new)]))
            .collect();

        let dn = self.dn();
        match self.session().passwd(&dn, old, new, &derived).await {
            Ok(()) => {}
            Err(DirectoryError::InvalidCredentials { .. }) => return Err(UgmError::InvalidCredentials),
            Err(err) => return Err(err.into()),
        }

        let mut names = vec![PASSWORD_ATTRIBUTE.to_string()];
        names.extend(secondary.iter().map(|password| password.attribute.clone()));
        self.refresh_attributes(&names).await?;

        info!(id = %self.id(), secondary = derived.len(), "Changed user password");
        Ok(())
    }

    /// Ids of the groups this user is a member of, ordered by group id.
    pub async fn group_ids(&self) -> Result<Vec<String>> {
        Ok(self.groups().await?.iter().map(|group| group.id().to_string()).collect())
    }

    /// Groups this user is a member of. Scans every group.
    pub async fn groups(&self) -> Result<Vec<Arc<Group>>> {
        let ugm = self.ugm()?;
        let mut groups = Vec::new();
        for group in ugm.groups().values().await? {
            if group.contains_member(self.id()).await? {
                groups.push(group);
            }
        }
        debug!(id = %self.id(), count = groups.len(), "Resolved user groups");
        Ok(groups)
    }

    pub async fn roles(&self) -> Result<Vec<String>> {
        self.ugm()?.roles(self).await
    }

    pub async fn add_role(&self, role: &str) -> Result<()> {
        self.ugm()?.add_role(role, self).await
    }

    pub async fn remove_role(&self, role: &str) -> Result<()> {
        self.ugm()?.remove_role(role, self).await
    }
}

impl Deref for User {
    type Target = PrincipalEntry;

    fn deref(&self) -> &PrincipalEntry {
        &self.0
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl PrincipalKind for User {
    const TYPE: PrincipalType = PrincipalType::User;

    fn from_entry(entry: PrincipalEntry) -> Self {
        User(entry)
    }

    fn entry(&self) -> &PrincipalEntry {
        &self.0
    }

    fn into_any(principal: Arc<Self>) -> AnyPrincipal {
        AnyPrincipal::User(principal)
    }

    fn from_any(principal: AnyPrincipal) -> std::result::Result<Arc<Self>, AnyPrincipal> {
        match principal {
            AnyPrincipal::User(user) => Ok(user),
            other => Err(other),
        }
    }
}

impl RoleMember for User {
    fn member_key(&self) -> String {
        self.id().to_string()
    }

    fn member_dn(&self) -> String {
        self.dn()
    }
}
