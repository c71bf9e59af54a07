//! Aliased attribute access
//!
//! Callers address attributes through the aliases of the store's attribute
//! map. Unmapped aliases are rejected; attributes outside the map stay
//! reachable only through `PrincipalEntry::directory_attributes`.

use ugm_directory::IntoAttributeValues;

use crate::principal::entity::PrincipalEntry;
use crate::shared::{Result, UgmError};

pub struct AliasedAttributes<'a> {
    entry: &'a PrincipalEntry,
}

impl<'a> AliasedAttributes<'a> {
    pub(crate) fn new(entry: &'a PrincipalEntry) -> Self {
        Self { entry }
    }

    pub fn get(&self, alias: &str) -> Result<Option<Vec<String>>> {
        let attr = self.entry.config().attr(alias)?;
        Ok(self.entry.read(|node| node.get(attr).cloned()))
    }

    /// First value of a (usually single-valued) attribute.
    pub fn first(&self, alias: &str) -> Result<Option<String>> {
        let attr = self.entry.config().attr(alias)?;
        Ok(self.entry.read(|node| node.first(attr).map(str::to_string)))
    }

    pub fn contains(&self, alias: &str) -> Result<bool> {
        Ok(self.get(alias)?.is_some())
    }

    /// Set an attribute. Marks the entry changed; nothing is written until
    /// the principal or its store is persisted.
    pub fn set(&self, alias: &str, values: impl IntoAttributeValues) -> Result<()> {
        let attr = self.mutable_attr(alias)?;
        let values = values.into_values();
        self.entry.write(|node| node.set(attr, values));
        Ok(())
    }

    pub fn remove(&self, alias: &str) -> Result<Option<Vec<String>>> {
        let attr = self.mutable_attr(alias)?;
        Ok(self.entry.write(|node| node.remove(attr)))
    }

    fn mutable_attr(&self, alias: &str) -> Result<&'a str> {
        let config = self.entry.config();
        let attr = config.attr(alias)?;
        if config.is_naming_alias(alias) {
            return Err(UgmError::ImmutableAttribute {
                alias: alias.to_string(),
            });
        }
        Ok(attr)
    }

    /// Present aliases with their values. Aliases sharing a directory
    /// attribute are reported once, `id` taking precedence and `rdn` last.
    pub fn items(&self) -> Vec<(String, Vec<String>)> {
        let order = self.entry.config().presentation_order();
        self.entry.read(|node| {
            let mut seen: Vec<&str> = Vec::new();
            let mut items = Vec::new();
            for (alias, attr) in order {
                if seen.iter().any(|s| s.eq_ignore_ascii_case(attr)) {
                    continue;
                }
                if let Some(values) = node.get(attr) {
                    seen.push(attr);
                    items.push((alias.to_string(), values.clone()));
                }
            }
            items
        })
    }

    pub fn keys(&self) -> Vec<String> {
        self.items().into_iter().map(|(alias, _)| alias).collect()
    }

    pub fn changed(&self) -> bool {
        self.entry.changed()
    }
}
