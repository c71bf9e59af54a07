//! LDAP directory session backed by `ldap3`

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use ldap3::controls::{Control, ControlType, PagedResults};
use ldap3::exop::PasswordModify;
use ldap3::result::ExopResult;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapResult, Mod, SearchEntry as LdapEntry, SearchResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::entry::Attributes;
use crate::error::{DirectoryError, Result};
use crate::session::{DirectorySession, Modification, SearchEntry, SearchPage, SearchRequest};

const RC_SUCCESS: u32 = 0;
const RC_NO_SUCH_OBJECT: u32 = 32;
const RC_INVALID_CREDENTIALS: u32 = 49;
const RC_ALREADY_EXISTS: u32 = 68;

/// Connection settings for an LDAP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LdapSettings {
    pub uri: String,
    pub bind_dn: Option<String>,
    pub bind_password: Option<String>,
    pub start_tls: bool,
    pub allow_invalid_certs: bool,
    pub timeout_secs: u64,
    /// Page size used when enumerating principals.
    pub page_size: usize,
}

impl Default for LdapSettings {
    fn default() -> Self {
        Self {
            uri: "ldap://localhost:389".to_string(),
            bind_dn: None,
            bind_password: None,
            start_tls: false,
            allow_invalid_certs: false,
            timeout_secs: 30,
            page_size: 500,
        }
    }
}

impl LdapSettings {
    fn conn_settings(&self) -> LdapConnSettings {
        LdapConnSettings::new()
            .set_conn_timeout(Duration::from_secs(self.timeout_secs))
            .set_starttls(self.start_tls)
            .set_no_tls_verify(self.allow_invalid_certs)
    }
}

/// Session over one service connection. Operations clone the `Ldap` handle,
/// which multiplexes over the same connection. Credential checks open a
/// separate connection so the service bind is never replaced.
pub struct LdapSession {
    settings: LdapSettings,
    ldap: Ldap,
}

impl LdapSession {
    pub async fn connect(settings: LdapSettings) -> Result<Self> {
        let (conn, mut ldap) = LdapConnAsync::with_settings(settings.conn_settings(), &settings.uri).await?;
        ldap3::drive!(conn);

        if let Some(bind_dn) = &settings.bind_dn {
            let password = settings.bind_password.as_deref().unwrap_or_default();
            let result = ldap.simple_bind(bind_dn, password).await?;
            check(result, bind_dn)?;
        }

        info!(uri = %settings.uri, bind_dn = ?settings.bind_dn, "Connected to LDAP server");
        Ok(Self { settings, ldap })
    }

    pub fn settings(&self) -> &LdapSettings {
        &self.settings
    }
}

/// Map well-known result codes onto directory errors.
fn check(result: LdapResult, dn: &str) -> Result<LdapResult> {
    match result.rc {
        RC_SUCCESS => Ok(result),
        RC_NO_SUCH_OBJECT => Err(DirectoryError::no_such_object(dn)),
        RC_ALREADY_EXISTS => Err(DirectoryError::already_exists(dn)),
        RC_INVALID_CREDENTIALS => Err(DirectoryError::InvalidCredentials { dn: dn.to_string() }),
        rc => Err(DirectoryError::Operation {
            dn: dn.to_string(),
            rc,
            message: result.text,
        }),
    }
}

fn value_set(values: &[String]) -> HashSet<&str> {
    values.iter().map(String::as_str).collect()
}

#[async_trait]
impl DirectorySession for LdapSession {
    async fn search(&self, request: &SearchRequest) -> Result<SearchPage> {
        let mut ldap = self.ldap.clone();
        let attributes = request
            .attributes
            .clone()
            .unwrap_or_else(|| vec!["*".to_string()]);
        let filter = request.filter.to_string();

        if let Some(size) = request.page_size.filter(|size| *size > 0) {
            let cookie = match request.cookie.as_deref() {
                Some(cookie) if !cookie.is_empty() => hex::decode(cookie).map_err(|_| DirectoryError::InvalidCookie {
                    cookie: cookie.to_string(),
                })?,
                _ => Vec::new(),
            };
            ldap.with_controls(PagedResults {
                size: size as i32,
                cookie,
            });
        }

        let SearchResult(entries, result) = ldap
            .search(&request.base, request.scope.into(), &filter, attributes)
            .await?;
        let result = check(result, &request.base)?;

        let mut cookie = None;
        for Control(kind, raw) in &result.ctrls {
            if let Some(ControlType::PagedResults) = kind {
                let paged: PagedResults = raw.parse();
                if !paged.cookie.is_empty() {
                    cookie = Some(hex::encode(paged.cookie));
                }
            }
        }

        let entries: Vec<SearchEntry> = entries
            .into_iter()
            .map(|entry| {
                let entry = LdapEntry::construct(entry);
                SearchEntry {
                    dn: entry.dn,
                    attrs: entry.attrs.into_iter().collect(),
                }
            })
            .collect();

        debug!(base = %request.base, %filter, count = entries.len(), "LDAP search");
        Ok(SearchPage { entries, cookie })
    }

    async fn add(&self, dn: &str, attrs: &Attributes) -> Result<()> {
        let mut ldap = self.ldap.clone();
        let attrs: Vec<(&str, HashSet<&str>)> = attrs
            .iter()
            .map(|(name, values)| (name.as_str(), value_set(values)))
            .collect();
        check(ldap.add(dn, attrs).await?, dn)?;
        debug!(%dn, "LDAP add");
        Ok(())
    }

    async fn modify(&self, dn: &str, changes: &[Modification]) -> Result<()> {
        let mut ldap = self.ldap.clone();
        let mods: Vec<Mod<&str>> = changes
            .iter()
            .map(|change| match change {
                Modification::Replace(name, values) => Mod::Replace(name.as_str(), value_set(values)),
                Modification::Delete(name) => Mod::Delete(name.as_str(), HashSet::new()),
            })
            .collect();
        check(ldap.modify(dn, mods).await?, dn)?;
        debug!(%dn, changes = changes.len(), "LDAP modify");
        Ok(())
    }

    async fn delete(&self, dn: &str) -> Result<()> {
        let mut ldap = self.ldap.clone();
        check(ldap.delete(dn).await?, dn)?;
        debug!(%dn, "LDAP delete");
        Ok(())
    }

    async fn bind(&self, dn: &str, credential: &str) -> Result<bool> {
        // An empty password would be an unauthenticated bind and always succeed.
        if credential.is_empty() {
            return Ok(false);
        }

        let (conn, mut ldap) =
            LdapConnAsync::with_settings(self.settings.conn_settings(), &self.settings.uri).await?;
        ldap3::drive!(conn);

        let result = ldap.simple_bind(dn, credential).await?;
        if let Err(err) = ldap.unbind().await {
            warn!(%dn, error = %err, "Failed to unbind credential check connection");
        }

        match check(result, dn) {
            Ok(_) => Ok(true),
            Err(DirectoryError::InvalidCredentials { .. }) | Err(DirectoryError::NoSuchObject { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn passwd(&self, dn: &str, old: &str, new: &str, derived: &[Modification]) -> Result<()> {
        let mut ldap = self.ldap.clone();
        let ExopResult(_, result) = ldap
            .extended(PasswordModify {
                user_id: Some(dn),
                old_pass: Some(old),
                new_pass: Some(new),
            })
            .await?;
        check(result, dn)?;

        if !derived.is_empty() {
            self.modify(dn, derived).await?;
        }
        info!(%dn, derived = derived.len(), "Password changed");
        Ok(())
    }

    fn type_name(&self) -> &'static str {
        "ldap"
    }
}
