//! Configuration loader with file and environment variable support

use std::env;
use std::path::PathBuf;

use tracing::{info, warn};

use crate::{ConfigError, UgmConfig};

/// Standard config file search paths
const CONFIG_PATHS: &[&str] = &[
    "ugm.toml",
    "./config/ugm.toml",
    "/etc/ugm/ugm.toml",
];

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "UGM_CONFIG";

/// Configuration loader
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
    search_paths: Option<Vec<PathBuf>>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a loader with a specific config file path
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config_path: Some(path.into()),
            search_paths: None,
        }
    }

    /// Replace the standard search paths
    pub fn with_search_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.search_paths = Some(paths.into_iter().map(Into::into).collect());
        self
    }

    /// Load configuration from file (if found) with environment variable
    /// overrides, then validate it
    pub fn load(&self) -> Result<UgmConfig, ConfigError> {
        let mut config = UgmConfig::default();

        if let Some(path) = self.find_config_file()? {
            info!(?path, "Loading configuration from file");
            config = UgmConfig::from_file(&path)?;
        }

        apply_overrides(&mut config, |key| env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Find the configuration file to use
    fn find_config_file(&self) -> Result<Option<PathBuf>, ConfigError> {
        // An explicit path that does not exist is an error, not a fallback
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Ok(Some(path.clone()));
            }
            return Err(ConfigError::ReadError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("config file {} not found", path.display()),
            )));
        }

        if let Ok(path) = env::var(CONFIG_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Ok(Some(path));
            }
            warn!(?path, "{} points to a missing file, ignoring", CONFIG_ENV);
        }

        let defaults: Vec<PathBuf> = CONFIG_PATHS.iter().map(PathBuf::from).collect();
        let paths = self.search_paths.as_ref().unwrap_or(&defaults);
        Ok(paths.iter().find(|path| path.exists()).cloned())
    }
}

/// Apply `UGM_*` overrides. `lookup` resolves a variable name; the loader
/// passes the process environment.
pub(crate) fn apply_overrides<F>(config: &mut UgmConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    // LDAP connection
    if let Some(val) = lookup("UGM_LDAP_URI") {
        config.ldap.uri = val;
    }
    if let Some(val) = lookup("UGM_LDAP_BIND_DN") {
        config.ldap.bind_dn = Some(val);
    }
    if let Some(val) = lookup("UGM_LDAP_BIND_PASSWORD") {
        config.ldap.bind_password = Some(val);
    }
    if let Some(val) = lookup("UGM_LDAP_START_TLS") {
        config.ldap.start_tls = parse_bool("UGM_LDAP_START_TLS", &val)?;
    }
    if let Some(val) = lookup("UGM_LDAP_TIMEOUT_SECS") {
        config.ldap.timeout_secs = val
            .parse()
            .map_err(|_| ConfigError::EnvError(format!("UGM_LDAP_TIMEOUT_SECS: invalid number '{val}'")))?;
    }
    if let Some(val) = lookup("UGM_LDAP_PAGE_SIZE") {
        config.ldap.page_size = val
            .parse()
            .map_err(|_| ConfigError::EnvError(format!("UGM_LDAP_PAGE_SIZE: invalid number '{val}'")))?;
    }

    // Store locations
    if let Some(val) = lookup("UGM_USERS_BASE_DN") {
        config.users.base_dn = val;
    }
    if let Some(val) = lookup("UGM_GROUPS_BASE_DN") {
        config.groups.base_dn = val;
    }
    if let Some(val) = lookup("UGM_ROLES_BASE_DN") {
        match config.roles.as_mut() {
            Some(roles) => roles.base_dn = val,
            None => warn!("UGM_ROLES_BASE_DN set but role support is not configured"),
        }
    }

    Ok(())
}

fn parse_bool(key: &str, val: &str) -> Result<bool, ConfigError> {
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::EnvError(format!("{key}: invalid boolean '{val}'"))),
    }
}
