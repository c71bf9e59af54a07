//! Directory session abstraction
//!
//! `DirectorySession` sits between the UGM layer and a concrete directory:
//! paged search, add/modify/delete, a credential check and a password change.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::entry::Attributes;
use crate::error::Result;
use crate::filter::Filter;

/// Search scope relative to the search base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// The base entry only.
    Base,
    /// Direct children of the base.
    #[serde(alias = "one_level", alias = "one")]
    OneLevel,
    /// The base and everything below it.
    #[default]
    Subtree,
}

impl From<Scope> for ldap3::Scope {
    fn from(scope: Scope) -> Self {
        match scope {
            Scope::Base => ldap3::Scope::Base,
            Scope::OneLevel => ldap3::Scope::OneLevel,
            Scope::Subtree => ldap3::Scope::Subtree,
        }
    }
}

/// One attribute change sent with a modify operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modification {
    Replace(String, Vec<String>),
    Delete(String),
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub base: String,
    pub scope: Scope,
    pub filter: Filter,
    /// Attributes to return, `None` for all user attributes.
    pub attributes: Option<Vec<String>>,
    pub page_size: Option<usize>,
    /// Continuation cookie of the previous page.
    pub cookie: Option<String>,
}

impl SearchRequest {
    pub fn new(base: impl Into<String>, scope: Scope, filter: Filter) -> Self {
        Self {
            base: base.into(),
            scope,
            filter,
            attributes: None,
            page_size: None,
            cookie: None,
        }
    }

    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = Some(attributes.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_page_size(mut self, page_size: Option<usize>) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_cookie(mut self, cookie: Option<String>) -> Self {
        self.cookie = cookie.filter(|c| !c.is_empty());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchEntry {
    pub dn: String,
    pub attrs: Attributes,
}

#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub entries: Vec<SearchEntry>,
    /// `None` once the result set is exhausted.
    pub cookie: Option<String>,
}

#[async_trait]
pub trait DirectorySession: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<SearchPage>;

    async fn add(&self, dn: &str, attrs: &Attributes) -> Result<()>;

    async fn modify(&self, dn: &str, changes: &[Modification]) -> Result<()>;

    async fn delete(&self, dn: &str) -> Result<()>;

    /// Check `credential` against the entry at `dn`. Wrong credentials and
    /// unknown entries both yield `Ok(false)`.
    async fn bind(&self, dn: &str, credential: &str) -> Result<bool>;

    /// Change the password of `dn` after the directory verified `old`.
    /// `derived` is applied together with the password change.
    async fn passwd(&self, dn: &str, old: &str, new: &str, derived: &[Modification]) -> Result<()>;

    /// Follow the cookies of a paged search and collect every entry.
    async fn search_all(&self, request: &SearchRequest) -> Result<Vec<SearchEntry>> {
        let mut request = request.clone();
        let mut entries = Vec::new();
        loop {
            let page = self.search(&request).await?;
            entries.extend(page.entries);
            match page.cookie {
                Some(cookie) if request.page_size.is_some() && !cookie.is_empty() => {
                    request.cookie = Some(cookie);
                }
                _ => break,
            }
        }
        Ok(entries)
    }

    fn type_name(&self) -> &'static str {
        "directory"
    }
}

impl std::fmt::Debug for dyn DirectorySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectorySession")
            .field("type", &self.type_name())
            .finish()
    }
}
