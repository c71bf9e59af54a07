//! UGM orchestrator
//!
//! Composes one users store, one groups store and optionally a roles store
//! over a shared directory session. Principals handed out by these stores
//! can navigate membership and roles through a weak link back to the `Ugm`.

use std::sync::Arc;

use tracing::{debug, info};
use ugm_config::UgmConfig;
use ugm_directory::{DirectorySession, LdapSession};

use crate::group::membership::{self, MemberFormat, Membership};
use crate::group::Groups;
use crate::principal::{PrincipalEntry, PrincipalKind, PrincipalType, Principals, PrincipalsConfig};
use crate::role::Roles;
use crate::shared::{Result, UgmError};
use crate::user::Users;

/// Prefix of group keys in role membership.
pub const GROUP_PREFIX: &str = "group:";

/// A principal that can be granted roles.
pub trait RoleMember: Send + Sync {
    /// Key under which the principal appears in role member ids.
    fn member_key(&self) -> String;

    fn member_dn(&self) -> String;
}

pub struct Ugm {
    users: Users,
    groups: Groups,
    roles: Option<Roles>,
}

impl Ugm {
    pub fn new(
        session: Arc<dyn DirectorySession>,
        users: PrincipalsConfig,
        groups: PrincipalsConfig,
        roles: Option<PrincipalsConfig>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|owner| Self {
            users: Principals::attached(session.clone(), users, owner.clone()),
            groups: Principals::attached(session.clone(), groups, owner.clone()),
            roles: roles.map(|config| Principals::attached(session.clone(), config, owner.clone())),
        })
    }

    /// Build from file configuration over an existing session.
    pub fn from_config(session: Arc<dyn DirectorySession>, config: &UgmConfig) -> Result<Arc<Self>> {
        config.validate()?;
        let page_size = config.ldap.page_size;
        let users = PrincipalsConfig::from_settings(&config.users, page_size)?;
        let groups = PrincipalsConfig::from_settings(&config.groups, page_size)?;
        let roles = config
            .roles
            .as_ref()
            .map(|settings| PrincipalsConfig::from_settings(settings, page_size))
            .transpose()?;

        info!(
            session = session.type_name(),
            users_base = %users.base_dn,
            groups_base = %groups.base_dn,
            roles = roles.is_some(),
            "UGM initialized"
        );
        Ok(Self::new(session, users, groups, roles))
    }

    /// Connect to the configured LDAP server and build from `config`.
    pub async fn connect(config: &UgmConfig) -> Result<Arc<Self>> {
        let session = LdapSession::connect(config.ldap.clone()).await?;
        Self::from_config(Arc::new(session), config)
    }

    pub fn users(&self) -> &Users {
        &self.users
    }

    pub fn groups(&self) -> &Groups {
        &self.groups
    }

    /// The roles store, if configured.
    pub fn roles_store(&self) -> Option<&Roles> {
        self.roles.as_ref()
    }

    fn require_roles(&self) -> Result<&Roles> {
        self.roles.as_ref().ok_or(UgmError::RolesNotConfigured)
    }

    /// Ids of the roles granted to `principal`, ordered by role id. Empty
    /// when roles are not configured.
    pub async fn roles(&self, principal: &dyn RoleMember) -> Result<Vec<String>> {
        let Some(roles) = &self.roles else {
            return Ok(Vec::new());
        };
        let mut granted = Vec::new();
        for role in roles.values().await? {
            if role.has_principal(principal)? {
                granted.push(role.id().to_string());
            }
        }
        Ok(granted)
    }

    /// Grant `role`, staging its creation when it does not exist yet.
    pub async fn add_role(&self, role: &str, principal: &dyn RoleMember) -> Result<()> {
        let roles = self.require_roles()?;
        let entry = match roles.get(role).await {
            Ok(entry) => entry,
            Err(err) if err.is_not_found() => roles.create_with_defaults(role).await?,
            Err(err) => return Err(err),
        };

        if entry.has_principal(principal)? {
            return Err(UgmError::RoleAlreadyGranted { role: role.to_string() });
        }
        let reference = entry.reference_for(principal)?;
        membership::add_member(entry.entry(), &principal.member_key(), &reference)?;
        info!(%role, member = %principal.member_key(), "Granted role");
        Ok(())
    }

    /// Revoke `role`. A role left without members is staged for deletion.
    pub async fn remove_role(&self, role: &str, principal: &dyn RoleMember) -> Result<()> {
        let roles = self.require_roles()?;
        let entry = match roles.get(role).await {
            Ok(entry) => entry,
            Err(err) if err.is_not_found() => return Err(UgmError::RoleNotFound { role: role.to_string() }),
            Err(err) => return Err(err),
        };

        if !entry.has_principal(principal)? {
            return Err(UgmError::RoleNotGranted { role: role.to_string() });
        }
        let reference = entry.reference_for(principal)?;
        membership::remove_member(entry.entry(), &principal.member_key(), &reference)?;
        info!(%role, member = %principal.member_key(), "Revoked role");

        if entry.member_count()? == 0 {
            roles.stage_delete(entry.id());
        }
        Ok(())
    }

    /// Persist staged role changes.
    pub async fn roles_storage(&self) -> Result<()> {
        match &self.roles {
            Some(roles) => roles.persist().await,
            None => {
                debug!("Roles not configured, nothing to persist");
                Ok(())
            }
        }
    }

    /// Persist users, then groups, then roles.
    pub async fn persist(&self) -> Result<()> {
        self.users.persist().await?;
        self.groups.persist().await?;
        self.roles_storage().await
    }

    /// Drop every cache, including staged changes.
    pub fn invalidate(&self) {
        self.users.invalidate_all();
        self.groups.invalidate_all();
        if let Some(roles) = &self.roles {
            roles.invalidate_all();
        }
    }

    /// Remove every group and role reference to a principal about to be
    /// deleted. Roles left without members are staged for deletion.
    pub(crate) async fn release_references(&self, kind: PrincipalType, id: &str, dn: &str) -> Result<()> {
        let key = match kind {
            PrincipalType::User => id.to_string(),
            PrincipalType::Group => format!("{GROUP_PREFIX}{id}"),
            PrincipalType::Role => return Ok(()),
        };

        if kind == PrincipalType::User {
            for group in self.groups.values().await? {
                if release(group.entry(), &key, dn)? {
                    debug!(group = %group.id(), member = %key, "Released group membership");
                }
            }
        }

        if let Some(roles) = &self.roles {
            for role in roles.values().await? {
                if !release(role.entry(), &key, dn)? {
                    continue;
                }
                debug!(role = %role.id(), member = %key, "Released role grant");
                if role.member_count()? == 0 {
                    roles.stage_delete(role.id());
                    info!(role = %role.id(), "Staged deletion of role without members");
                }
            }
        }
        Ok(())
    }
}

fn release(entry: &PrincipalEntry, key: &str, dn: &str) -> Result<bool> {
    let membership = Membership::of(entry)?;
    let reference = match membership.format {
        MemberFormat::Dn => dn,
        MemberFormat::Uid => key,
    };
    Ok(entry.write(|node| membership.remove_reference(node, reference)))
}

impl std::fmt::Debug for Ugm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ugm")
            .field("users", &self.users)
            .field("groups", &self.groups)
            .field("roles", &self.roles)
            .finish()
    }
}
