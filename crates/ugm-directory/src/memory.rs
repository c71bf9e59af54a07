//! In-memory directory session
//!
//! Keeps entries in insertion order, keyed by normalized DN. Used by the test
//! suites and by embedders that want the UGM layer without a directory
//! server. Passwords are stored and compared in plain text.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::debug;

use crate::dn;
use crate::entry::{apply_modifications, find_values, put_values, Attributes};
use crate::error::{DirectoryError, Result};
use crate::session::{DirectorySession, Modification, Scope, SearchEntry, SearchPage, SearchRequest};

const PASSWORD_ATTRIBUTE: &str = "userPassword";

#[derive(Debug, Clone)]
struct StoredEntry {
    dn: String,
    attrs: Attributes,
}

#[derive(Debug, Default)]
pub struct MemoryDirectory {
    entries: RwLock<IndexMap<String, StoredEntry>>,
    searches: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an entry, replacing any entry with the same DN.
    pub fn insert<I, K, V>(&self, dn: &str, attrs: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: crate::entry::IntoAttributeValues,
    {
        let key = dn::normalize(dn)?;
        let mut stored = Attributes::new();
        for (name, values) in attrs {
            put_values(&mut stored, &name.into(), values.into_values());
        }
        self.entries.write().insert(
            key,
            StoredEntry {
                dn: dn.to_string(),
                attrs: stored,
            },
        );
        Ok(())
    }

    /// Attributes of the entry at `dn`, if present.
    pub fn entry(&self, dn: &str) -> Option<Attributes> {
        let key = dn::normalize(dn).ok()?;
        self.entries.read().get(&key).map(|e| e.attrs.clone())
    }

    pub fn contains(&self, dn: &str) -> bool {
        self.entry(dn).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Number of search operations served so far.
    pub fn search_count(&self) -> usize {
        self.searches.load(Ordering::Relaxed)
    }

    /// Number of add, modify, delete and passwd operations applied so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    fn in_scope(entry_dn: &str, base: &str, scope: Scope) -> bool {
        match (dn::depth_below(entry_dn, base), scope) {
            (Some(0), Scope::Base) => true,
            (Some(1), Scope::OneLevel) => true,
            (Some(_), Scope::Subtree) => true,
            _ => false,
        }
    }

    fn project(attrs: &Attributes, wanted: Option<&Vec<String>>) -> Attributes {
        match wanted {
            Some(names) if !names.iter().any(|n| n == "*") => names
                .iter()
                .filter_map(|name| {
                    attrs
                        .iter()
                        .find(|(k, _)| k.eq_ignore_ascii_case(name))
                        .map(|(k, v)| (k.clone(), v.clone()))
                })
                .collect(),
            _ => attrs.clone(),
        }
    }
}

#[async_trait]
impl DirectorySession for MemoryDirectory {
    async fn search(&self, request: &SearchRequest) -> Result<SearchPage> {
        self.searches.fetch_add(1, Ordering::Relaxed);
        let base = dn::normalize(&request.base)?;

        let matched: Vec<SearchEntry> = self
            .entries
            .read()
            .iter()
            .filter(|(key, entry)| {
                Self::in_scope(key, &base, request.scope) && request.filter.matches(&entry.attrs)
            })
            .map(|(_, entry)| SearchEntry {
                dn: entry.dn.clone(),
                attrs: Self::project(&entry.attrs, request.attributes.as_ref()),
            })
            .collect();

        debug!(
            base = %request.base,
            filter = %request.filter,
            matched = matched.len(),
            "Memory directory search"
        );

        let Some(page_size) = request.page_size.filter(|size| *size > 0) else {
            return Ok(SearchPage {
                entries: matched,
                cookie: None,
            });
        };

        let offset = match request.cookie.as_deref() {
            None | Some("") => 0,
            Some(cookie) => cookie
                .parse::<usize>()
                .ok()
                .filter(|offset| *offset <= matched.len())
                .ok_or_else(|| DirectoryError::InvalidCookie {
                    cookie: cookie.to_string(),
                })?,
        };
        let end = offset.saturating_add(page_size).min(matched.len());
        let cookie = (end < matched.len()).then(|| end.to_string());
        let entries = matched.into_iter().skip(offset).take(page_size).collect();

        Ok(SearchPage { entries, cookie })
    }

    async fn add(&self, dn: &str, attrs: &Attributes) -> Result<()> {
        let key = dn::normalize(dn)?;
        let mut entries = self.entries.write();
        if entries.contains_key(&key) {
            return Err(DirectoryError::already_exists(dn));
        }
        entries.insert(
            key,
            StoredEntry {
                dn: dn.to_string(),
                attrs: attrs.clone(),
            },
        );
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn modify(&self, dn: &str, changes: &[Modification]) -> Result<()> {
        let key = dn::normalize(dn)?;
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(&key)
            .ok_or_else(|| DirectoryError::no_such_object(dn))?;
        apply_modifications(&mut entry.attrs, changes);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn delete(&self, dn: &str) -> Result<()> {
        let key = dn::normalize(dn)?;
        self.entries
            .write()
            .shift_remove(&key)
            .ok_or_else(|| DirectoryError::no_such_object(dn))?;
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn bind(&self, dn: &str, credential: &str) -> Result<bool> {
        if credential.is_empty() {
            return Ok(false);
        }
        let Ok(key) = dn::normalize(dn) else {
            return Ok(false);
        };
        let entries = self.entries.read();
        Ok(entries
            .get(&key)
            .and_then(|entry| find_values(&entry.attrs, PASSWORD_ATTRIBUTE))
            .is_some_and(|values| values.iter().any(|v| v == credential)))
    }

    async fn passwd(&self, dn: &str, old: &str, new: &str, derived: &[Modification]) -> Result<()> {
        let key = dn::normalize(dn)?;
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(&key)
            .ok_or_else(|| DirectoryError::no_such_object(dn))?;

        let verified = find_values(&entry.attrs, PASSWORD_ATTRIBUTE)
            .is_some_and(|values| values.iter().any(|v| v == old));
        if !verified {
            return Err(DirectoryError::InvalidCredentials { dn: dn.to_string() });
        }

        put_values(&mut entry.attrs, PASSWORD_ATTRIBUTE, vec![new.to_string()]);
        apply_modifications(&mut entry.attrs, derived);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn type_name(&self) -> &'static str {
        "memory"
    }
}
