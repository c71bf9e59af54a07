//! Principal store configuration

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use ugm_config::PrincipalSettings;
use ugm_directory::{Filter, IntoAttributeValues, Scope};

use crate::principal::PrincipalStore;
use crate::shared::{Result, UgmError};

/// Aliases every store must map.
pub const ID_ALIAS: &str = "id";
pub const RDN_ALIAS: &str = "rdn";
pub const LOGIN_ALIAS: &str = "login";

/// Computes a default from the store and the id being created.
pub type DefaultFn = Arc<dyn Fn(&dyn PrincipalStore, &str) -> Vec<String> + Send + Sync>;

/// Default value applied to aliases not supplied on creation.
#[derive(Clone)]
pub enum DefaultValue {
    Literal(Vec<String>),
    Computed(DefaultFn),
}

impl DefaultValue {
    pub fn literal(values: impl IntoAttributeValues) -> Self {
        DefaultValue::Literal(values.into_values())
    }

    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&dyn PrincipalStore, &str) -> Vec<String> + Send + Sync + 'static,
    {
        DefaultValue::Computed(Arc::new(f))
    }

    pub fn resolve(&self, store: &dyn PrincipalStore, id: &str) -> Vec<String> {
        match self {
            DefaultValue::Literal(values) => values.clone(),
            DefaultValue::Computed(f) => f(store, id),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Literal(values) => f.debug_tuple("Literal").field(values).finish(),
            DefaultValue::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// An attribute derived from the cleartext password on every password
/// change, e.g. legacy hash mirrors.
#[derive(Clone)]
pub struct SecondaryPassword {
    pub attribute: String,
    pub derive: Arc<dyn Fn(&str) -> String + Send + Sync>,
}

impl SecondaryPassword {
    pub fn new<F>(attribute: impl Into<String>, derive: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self {
            attribute: attribute.into(),
            derive: Arc::new(derive),
        }
    }
}

impl fmt::Debug for SecondaryPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecondaryPassword")
            .field("attribute", &self.attribute)
            .finish_non_exhaustive()
    }
}

/// Immutable configuration of one principal store.
#[derive(Debug, Clone)]
pub struct PrincipalsConfig {
    pub base_dn: String,
    /// Alias to directory attribute, in declaration order.
    pub attrmap: IndexMap<String, String>,
    pub scope: Scope,
    pub query_filter: Filter,
    /// Object classes written to new entries.
    pub object_classes: Vec<String>,
    pub defaults: IndexMap<String, DefaultValue>,
    pub secondary_passwords: Vec<SecondaryPassword>,
    pub page_size: Option<usize>,
}

impl PrincipalsConfig {
    /// Fails unless `attrmap` maps both `id` and `rdn`.
    pub fn new<I, A, B>(base_dn: impl Into<String>, attrmap: I) -> Result<Self>
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<String>,
        B: Into<String>,
    {
        let attrmap: IndexMap<String, String> = attrmap
            .into_iter()
            .map(|(alias, attr)| (alias.into(), attr.into()))
            .collect();
        for alias in [ID_ALIAS, RDN_ALIAS] {
            if !attrmap.contains_key(alias) {
                return Err(UgmError::validation(format!("attribute map must contain '{alias}'")));
            }
        }

        Ok(Self {
            base_dn: base_dn.into(),
            attrmap,
            scope: Scope::OneLevel,
            query_filter: Filter::everything(),
            object_classes: Vec::new(),
            defaults: IndexMap::new(),
            secondary_passwords: Vec::new(),
            page_size: None,
        })
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_query_filter(mut self, filter: Filter) -> Self {
        self.query_filter = filter;
        self
    }

    pub fn with_object_classes<I, S>(mut self, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.object_classes = classes.into_iter().map(Into::into).collect();
        self
    }

    /// Fails if `alias` is not mapped.
    pub fn with_default(mut self, alias: impl Into<String>, value: DefaultValue) -> Result<Self> {
        let alias = alias.into();
        self.attr(&alias)?;
        self.defaults.insert(alias, value);
        Ok(self)
    }

    pub fn with_secondary_password(mut self, secondary: SecondaryPassword) -> Self {
        self.secondary_passwords.push(secondary);
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = (page_size > 0).then_some(page_size);
        self
    }

    /// Directory attribute mapped to `alias`.
    pub fn attr(&self, alias: &str) -> Result<&str> {
        self.attrmap
            .get(alias)
            .map(String::as_str)
            .ok_or_else(|| UgmError::unknown_alias(alias))
    }

    pub fn id_attr(&self) -> &str {
        self.attrmap.get(ID_ALIAS).map(String::as_str).unwrap_or_default()
    }

    pub fn rdn_attr(&self) -> &str {
        self.attrmap.get(RDN_ALIAS).map(String::as_str).unwrap_or_default()
    }

    pub fn login_attr(&self) -> Option<&str> {
        self.attrmap.get(LOGIN_ALIAS).map(String::as_str)
    }

    /// Aliases in the order they are presented: `id` first, `rdn` last,
    /// everything else in declaration order.
    pub(crate) fn presentation_order(&self) -> Vec<(&str, &str)> {
        let mut order: Vec<(&str, &str)> = Vec::with_capacity(self.attrmap.len());
        order.push((ID_ALIAS, self.id_attr()));
        order.extend(
            self.attrmap
                .iter()
                .filter(|(alias, _)| alias.as_str() != ID_ALIAS && alias.as_str() != RDN_ALIAS)
                .map(|(alias, attr)| (alias.as_str(), attr.as_str())),
        );
        order.push((RDN_ALIAS, self.rdn_attr()));
        order
    }

    /// Whether `alias` names the id or rdn attribute, which are fixed once
    /// an entry exists.
    pub(crate) fn is_naming_alias(&self, alias: &str) -> bool {
        match self.attrmap.get(alias) {
            Some(attr) => {
                attr.eq_ignore_ascii_case(self.id_attr()) || attr.eq_ignore_ascii_case(self.rdn_attr())
            }
            None => false,
        }
    }

    /// Build a store configuration from file settings. `page_size` is the
    /// connection-wide fallback.
    pub fn from_settings(settings: &PrincipalSettings, page_size: usize) -> Result<Self> {
        let query_filter = if settings.query_filter.trim().is_empty() {
            Filter::everything()
        } else {
            Filter::parse(&settings.query_filter)?
        };

        let mut config = Self::new(settings.base_dn.clone(), settings.attrmap.clone())?
            .with_scope(settings.scope)
            .with_query_filter(query_filter)
            .with_object_classes(settings.object_classes.iter().cloned())
            .with_page_size(settings.page_size.unwrap_or(page_size));
        for (alias, value) in &settings.defaults {
            config = config.with_default(alias.clone(), DefaultValue::Literal(value.values()))?;
        }
        Ok(config)
    }
}
