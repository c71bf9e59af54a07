//! Group principal

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use tracing::warn;
use ugm_directory::DirectoryEntry;

use crate::group::membership::{self, MemberFormat, Membership};
use crate::principal::{AnyPrincipal, PrincipalEntry, PrincipalKind, PrincipalType};
use crate::shared::{Result, UgmError};
use crate::ugm::{RoleMember, GROUP_PREFIX};
use crate::user::User;

pub struct Group(PrincipalEntry);

impl Group {
    pub fn membership(&self) -> Result<Membership> {
        Membership::of(&self.0)
    }

    /// Ids of the member users in attribute order. References without a
    /// matching user are skipped.
    pub async fn member_ids(&self) -> Result<Vec<String>> {
        let ugm = self.ugm()?;
        let membership = self.membership()?;
        let references = self.read(|node| membership.references(node));
        if membership.format == MemberFormat::Uid {
            return Ok(references);
        }

        let mut ids = Vec::with_capacity(references.len());
        for reference in references {
            match ugm.users().idbydn(&reference).await {
                Ok(id) => ids.push(id),
                Err(UgmError::DnNotFound { .. }) => {
                    warn!(group = %self.id(), member = %reference, "Skipping stale member reference");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(ids)
    }

    /// Reference stored for the user `id`: its DN or the bare id.
    pub async fn translate_key(&self, id: &str) -> Result<String> {
        let ugm = self.ugm()?;
        let user = ugm.users().get(id).await?;
        Ok(match self.membership()?.format {
            MemberFormat::Dn => user.dn(),
            MemberFormat::Uid => id.to_string(),
        })
    }

    /// Stage the user `id` as member.
    pub async fn add(&self, id: &str) -> Result<()> {
        let reference = self.translate_key(id).await?;
        membership::add_member(&self.0, id, &reference)
    }

    /// Stage removal of the member `id`.
    pub async fn remove(&self, id: &str) -> Result<()> {
        let reference = match self.translate_key(id).await {
            Ok(reference) => reference,
            Err(err) if err.is_not_found() => return Err(UgmError::member_not_found(id)),
            Err(err) => return Err(err),
        };
        membership::remove_member(&self.0, id, &reference)
    }

    pub async fn contains_member(&self, id: &str) -> Result<bool> {
        let membership = self.membership()?;
        let reference = match self.translate_key(id).await {
            Ok(reference) => reference,
            Err(err) if err.is_not_found() => return Ok(false),
            Err(err) => return Err(err),
        };
        Ok(self.read(|node| membership.has_reference(node, &reference)))
    }

    /// The member user `id`; `MemberNotFound` unless it is a member.
    pub async fn get_member(&self, id: &str) -> Result<Arc<User>> {
        if !self.contains_member(id).await? {
            return Err(UgmError::member_not_found(id));
        }
        self.ugm()?.users().get(id).await
    }

    /// Member users.
    pub async fn users(&self) -> Result<Vec<Arc<User>>> {
        let ugm = self.ugm()?;
        let mut users = Vec::new();
        for id in self.member_ids().await? {
            match ugm.users().get(&id).await {
                Ok(user) => users.push(user),
                Err(err) if err.is_not_found() => {
                    warn!(group = %self.id(), member = %id, "Skipping member without user");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(users)
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

impl Deref for Group {
    type Target = PrincipalEntry;

    fn deref(&self) -> &PrincipalEntry {
        &self.0
    }
}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl PrincipalKind for Group {
    const TYPE: PrincipalType = PrincipalType::Group;

    fn from_entry(entry: PrincipalEntry) -> Self {
        Group(entry)
    }

    fn entry(&self) -> &PrincipalEntry {
        &self.0
    }

    fn into_any(principal: Arc<Self>) -> AnyPrincipal {
        AnyPrincipal::Group(principal)
    }

    fn from_any(principal: AnyPrincipal) -> std::result::Result<Arc<Self>, AnyPrincipal> {
        match principal {
            AnyPrincipal::Group(group) => Ok(group),
            other => Err(other),
        }
    }

    fn prepare(node: &mut DirectoryEntry) -> Result<()> {
        membership::prepare_members(node)
    }
}

impl RoleMember for Group {
    fn member_key(&self) -> String {
        format!("{GROUP_PREFIX}{}", self.id())
    }

    fn member_dn(&self) -> String {
        self.dn()
    }
}
