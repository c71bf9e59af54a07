//! Role principal
//!
//! Roles hold users and groups. Group members are keyed `group:<id>`; keys
//! without the prefix name users.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use tracing::warn;
use ugm_directory::DirectoryEntry;

use crate::group::membership::{self, MemberFormat, Membership};
use crate::principal::{AnyPrincipal, PrincipalEntry, PrincipalKind, PrincipalType};
use crate::shared::{Result, UgmError};
use crate::ugm::{RoleMember, GROUP_PREFIX};

pub struct Role(PrincipalEntry);

impl Role {
    pub fn membership(&self) -> Result<Membership> {
        Membership::of(&self.0)
    }

    /// Member keys in attribute order. DNs resolve to user ids first, then
    /// to prefixed group ids; anything else is skipped.
    pub async fn member_ids(&self) -> Result<Vec<String>> {
        let ugm = self.ugm()?;
        let membership = self.membership()?;
        let references = self.read(|node| membership.references(node));
        if membership.format == MemberFormat::Uid {
            return Ok(references);
        }

        let mut keys = Vec::with_capacity(references.len());
        for reference in references {
            match ugm.users().idbydn(&reference).await {
                Ok(id) => {
                    keys.push(id);
                    continue;
                }
                Err(UgmError::DnNotFound { .. }) => {}
                Err(err) => return Err(err),
            }
            match ugm.groups().idbydn(&reference).await {
                Ok(id) => keys.push(format!("{GROUP_PREFIX}{id}")),
                Err(UgmError::DnNotFound { .. }) => {
                    warn!(role = %self.id(), member = %reference, "Skipping stale member reference");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(keys)
    }

    /// Reference stored for the member `key`.
    pub async fn translate_key(&self, key: &str) -> Result<String> {
        let ugm = self.ugm()?;
        let format = self.membership()?.format;
        if format == MemberFormat::Uid {
            return Ok(key.to_string());
        }
        Ok(match key.strip_prefix(GROUP_PREFIX) {
            Some(group_id) => ugm.groups().get(group_id).await?.dn(),
            None => ugm.users().get(key).await?.dn(),
        })
    }

    /// Reference of an already resolved principal.
    pub(crate) fn reference_for(&self, member: &dyn RoleMember) -> Result<String> {
        Ok(match self.membership()?.format {
            MemberFormat::Dn => member.member_dn(),
            MemberFormat::Uid => member.member_key(),
        })
    }

    pub async fn add(&self, key: &str) -> Result<()> {
        let reference = self.translate_key(key).await?;
        membership::add_member(&self.0, key, &reference)
    }

    pub async fn remove(&self, key: &str) -> Result<()> {
        let reference = match self.translate_key(key).await {
            Ok(reference) => reference,
            Err(err) if err.is_not_found() => return Err(UgmError::member_not_found(key)),
            Err(err) => return Err(err),
        };
        membership::remove_member(&self.0, key, &reference)
    }

    pub(crate) fn has_principal(&self, member: &dyn RoleMember) -> Result<bool> {
        let membership = self.membership()?;
        let reference = self.reference_for(member)?;
        Ok(self.read(|node| membership.has_reference(node, &reference)))
    }

    pub async fn contains_member(&self, key: &str) -> Result<bool> {
        let membership = self.membership()?;
        let reference = match self.translate_key(key).await {
            Ok(reference) => reference,
            Err(err) if err.is_not_found() => return Ok(false),
            Err(err) => return Err(err),
        };
        Ok(self.read(|node| membership.has_reference(node, &reference)))
    }

    /// The user or group behind `key`; `MemberNotFound` unless it is a
    /// member.
    pub async fn get_member(&self, key: &str) -> Result<AnyPrincipal> {
        if !self.contains_member(key).await? {
            return Err(UgmError::member_not_found(key));
        }
        let ugm = self.ugm()?;
        Ok(match key.strip_prefix(GROUP_PREFIX) {
            Some(group_id) => ugm.groups().get(group_id).await?.into(),
            None => ugm.users().get(key).await?.into(),
        })
    }

    /// Number of stored references, placeholder excluded.
    pub fn member_count(&self) -> Result<usize> {
        let membership = self.membership()?;
        Ok(self.read(|node| membership.references(node).len()))
    }
}

impl Deref for Role {
    type Target = PrincipalEntry;

    fn deref(&self) -> &PrincipalEntry {
        &self.0
    }
}

impl fmt::Debug for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl PrincipalKind for Role {
    const TYPE: PrincipalType = PrincipalType::Role;

    fn from_entry(entry: PrincipalEntry) -> Self {
        Role(entry)
    }

    fn entry(&self) -> &PrincipalEntry {
        &self.0
    }

    fn into_any(principal: Arc<Self>) -> AnyPrincipal {
        AnyPrincipal::Role(principal)
    }

    fn from_any(principal: AnyPrincipal) -> std::result::Result<Arc<Self>, AnyPrincipal> {
        match principal {
            AnyPrincipal::Role(role) => Ok(role),
            other => Err(other),
        }
    }

    fn prepare(node: &mut DirectoryEntry) -> Result<()> {
        membership::prepare_members(node)
    }
}
