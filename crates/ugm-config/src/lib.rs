//! UGM Configuration System
//!
//! TOML-based configuration for the directory connection and the three
//! principal stores, with environment variable overrides.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ugm_directory::{LdapSettings, Scope};

mod loader;

pub use loader::ConfigLoader;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("Environment variable error: {0}")]
    EnvError(String),
}

/// Root configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UgmConfig {
    pub ldap: LdapSettings,
    pub users: PrincipalSettings,
    pub groups: PrincipalSettings,
    /// Role support is enabled by configuring a roles store.
    pub roles: Option<PrincipalSettings>,
}

impl Default for UgmConfig {
    fn default() -> Self {
        Self {
            ldap: LdapSettings::default(),
            users: PrincipalSettings::users(),
            groups: PrincipalSettings::groups(),
            roles: None,
        }
    }
}

/// A literal default value for newly created principals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefaultSetting {
    Single(String),
    Multiple(Vec<String>),
}

impl DefaultSetting {
    pub fn values(&self) -> Vec<String> {
        match self {
            DefaultSetting::Single(value) => vec![value.clone()],
            DefaultSetting::Multiple(values) => values.clone(),
        }
    }
}

/// Settings of one principal store (users, groups or roles).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrincipalSettings {
    pub base_dn: String,
    /// Alias to directory attribute. Must map `id` and `rdn`.
    pub attrmap: IndexMap<String, String>,
    pub scope: Scope,
    pub query_filter: String,
    pub object_classes: Vec<String>,
    pub defaults: IndexMap<String, DefaultSetting>,
    /// Overrides `ldap.page_size` for this store.
    pub page_size: Option<usize>,
}

impl Default for PrincipalSettings {
    fn default() -> Self {
        Self {
            base_dn: String::new(),
            attrmap: IndexMap::new(),
            scope: Scope::OneLevel,
            query_filter: String::new(),
            object_classes: Vec::new(),
            defaults: IndexMap::new(),
            page_size: None,
        }
    }
}

fn attrmap(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
    pairs
        .iter()
        .map(|(alias, attr)| (alias.to_string(), attr.to_string()))
        .collect()
}

impl PrincipalSettings {
    /// `inetOrgPerson` users keyed by `uid`.
    pub fn users() -> Self {
        Self {
            base_dn: "ou=users,dc=example,dc=com".to_string(),
            attrmap: attrmap(&[("id", "uid"), ("login", "uid"), ("rdn", "uid"), ("mail", "mail")]),
            query_filter: "(objectClass=inetOrgPerson)".to_string(),
            object_classes: ["top", "person", "organizationalPerson", "inetOrgPerson"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            ..Default::default()
        }
    }

    /// `groupOfNames` groups keyed by `cn`.
    pub fn groups() -> Self {
        Self {
            base_dn: "ou=groups,dc=example,dc=com".to_string(),
            attrmap: attrmap(&[("id", "cn"), ("rdn", "cn")]),
            query_filter: "(objectClass=groupOfNames)".to_string(),
            object_classes: vec!["groupOfNames".to_string()],
            ..Default::default()
        }
    }

    /// `groupOfNames` roles keyed by `cn`.
    pub fn roles() -> Self {
        Self {
            base_dn: "ou=roles,dc=example,dc=com".to_string(),
            ..Self::groups()
        }
    }

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if self.base_dn.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!("{name}.base_dn must not be empty")));
        }
        for alias in ["id", "rdn"] {
            if !self.attrmap.contains_key(alias) {
                return Err(ConfigError::ValidationError(format!(
                    "{name}.attrmap must map '{alias}'"
                )));
            }
        }
        if let Some(alias) = self.defaults.keys().find(|alias| !self.attrmap.contains_key(*alias)) {
            return Err(ConfigError::ValidationError(format!(
                "{name}.defaults names unmapped alias '{alias}'"
            )));
        }
        if self.page_size == Some(0) {
            return Err(ConfigError::ValidationError(format!("{name}.page_size must be positive")));
        }
        Ok(())
    }
}

impl UgmConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: UgmConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Load configuration with environment variable override
    pub fn load() -> Result<Self, ConfigError> {
        ConfigLoader::new().load()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ldap.uri.trim().is_empty() {
            return Err(ConfigError::ValidationError("ldap.uri must not be empty".to_string()));
        }
        if self.ldap.page_size == 0 {
            return Err(ConfigError::ValidationError("ldap.page_size must be positive".to_string()));
        }
        self.users.validate("users")?;
        self.groups.validate("groups")?;
        if let Some(roles) = &self.roles {
            roles.validate("roles")?;
        }
        Ok(())
    }

    /// Generate an example TOML configuration
    pub fn example_toml() -> String {
        r#"# UGM Configuration
# Environment variables override these settings

[ldap]
uri = "ldap://localhost:389"
bind_dn = "cn=admin,dc=example,dc=com"
bind_password = "secret"
start_tls = false
timeout_secs = 30
page_size = 500

[users]
base_dn = "ou=users,dc=example,dc=com"
scope = "onelevel"
query_filter = "(objectClass=inetOrgPerson)"
object_classes = ["top", "person", "organizationalPerson", "inetOrgPerson"]

[users.attrmap]
id = "uid"
login = "uid"
rdn = "uid"
mail = "mail"
sn = "sn"

[users.defaults]
sn = "Unknown"

[groups]
base_dn = "ou=groups,dc=example,dc=com"
scope = "onelevel"
query_filter = "(objectClass=groupOfNames)"
object_classes = ["groupOfNames"]

[groups.attrmap]
id = "cn"
rdn = "cn"

# Remove this table to disable role support
[roles]
base_dn = "ou=roles,dc=example,dc=com"
scope = "onelevel"
query_filter = "(objectClass=groupOfNames)"
object_classes = ["groupOfNames"]

[roles.attrmap]
id = "cn"
rdn = "cn"
"#
        .to_string()
    }
}
