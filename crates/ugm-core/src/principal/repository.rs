//! Principal store
//!
//! `Principals<P>` is a keyed container over the directory entries matching
//! a store's query. Principals are materialized on first access and cached
//! by id, so repeated lookups return the same `Arc` until invalidated.
//! Creations, deletions and attribute edits are staged in memory and only
//! written by `persist`.

use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::{debug, info, warn};
use ugm_directory::entry::{find_values, put_values};
use ugm_directory::{
    dn, Attributes, DirectoryEntry, DirectorySession, Filter, IntoAttributeValues, SearchEntry, SearchRequest,
};

use crate::principal::config::{PrincipalsConfig, ID_ALIAS, LOGIN_ALIAS, RDN_ALIAS};
use crate::principal::entity::{AnyPrincipal, PrincipalEntry, PrincipalKind, PrincipalStore, PrincipalType, StoreContext};
use crate::principal::search::SearchQuery;
use crate::shared::{Result, UgmError};
use crate::ugm::Ugm;

/// Aliased attribute values returned by `Principals::search_attrs`.
pub type AliasedValues = IndexMap<String, Vec<String>>;

/// Ids and DNs of every entry matching the store query.
#[derive(Debug, Default)]
struct IdIndex {
    dns: IndexMap<String, String>,
    ids_by_dn: HashMap<String, String>,
}

impl IdIndex {
    /// The id as stored in the directory. Ids match without regard to case,
    /// like the directory matches them.
    fn stored_id(&self, id: &str) -> Option<&str> {
        if let Some((stored, _)) = self.dns.get_key_value(id) {
            return Some(stored);
        }
        let wanted = id.to_lowercase();
        self.dns.keys().find(|stored| stored.to_lowercase() == wanted).map(String::as_str)
    }
}

struct StoreState<P> {
    storage: IndexMap<String, Arc<P>>,
    /// Built on first enumeration; dropped when entries are added or
    /// deleted and on full invalidation.
    index: Option<Arc<IdIndex>>,
    /// Staged deletions, id to DN.
    deleted: IndexMap<String, String>,
}

impl<P> Default for StoreState<P> {
    fn default() -> Self {
        Self {
            storage: IndexMap::new(),
            index: None,
            deleted: IndexMap::new(),
        }
    }
}

pub struct Principals<P: PrincipalKind> {
    context: Arc<StoreContext>,
    state: RwLock<StoreState<P>>,
}

impl<P: PrincipalKind> Principals<P> {
    /// A standalone store. Membership and role navigation of its principals
    /// fails with `UgmError::Detached`.
    pub fn new(session: Arc<dyn DirectorySession>, config: PrincipalsConfig) -> Self {
        Self::build(session, config, None)
    }

    pub(crate) fn attached(session: Arc<dyn DirectorySession>, config: PrincipalsConfig, owner: Weak<Ugm>) -> Self {
        Self::build(session, config, Some(owner))
    }

    fn build(session: Arc<dyn DirectorySession>, config: PrincipalsConfig, owner: Option<Weak<Ugm>>) -> Self {
        Self {
            context: Arc::new(StoreContext {
                principal_type: P::TYPE,
                config,
                session,
                owner,
            }),
            state: RwLock::new(StoreState::default()),
        }
    }

    pub fn principal_type(&self) -> PrincipalType {
        P::TYPE
    }

    pub fn config(&self) -> &PrincipalsConfig {
        &self.context.config
    }

    pub(crate) fn session(&self) -> &dyn DirectorySession {
        self.context.session.as_ref()
    }

    fn owner(&self) -> Option<Arc<Ugm>> {
        self.context.owner.as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn entry_id(&self, attrs: &Attributes) -> Option<String> {
        find_values(attrs, self.config().id_attr()).and_then(|values| values.first()).cloned()
    }

    pub(crate) fn base_request(&self, filter: Filter) -> SearchRequest {
        let config = self.config();
        SearchRequest::new(config.base_dn.clone(), config.scope, filter)
    }

    /// Load the id index, validating `id` and `login` uniqueness.
    async fn index(&self) -> Result<Arc<IdIndex>> {
        if let Some(index) = self.state.read().index.clone() {
            return Ok(index);
        }

        let config = self.config();
        let id_attr = config.id_attr();
        let login_attr = config.login_attr().filter(|login| !login.eq_ignore_ascii_case(id_attr));

        let mut attributes = vec![id_attr.to_string()];
        attributes.extend(login_attr.map(str::to_string));
        let request = self
            .base_request(config.query_filter.clone())
            .with_attributes(attributes)
            .with_page_size(config.page_size);
        let entries = self.session().search_all(&request).await?;

        let mut index = IdIndex::default();
        let mut seen_ids = HashSet::new();
        let mut seen_logins = HashSet::new();
        for entry in entries {
            let Some(id) = self.entry_id(&entry.attrs) else {
                warn!(dn = %entry.dn, principal_type = %P::TYPE, "Skipping entry without id attribute");
                continue;
            };
            if !seen_ids.insert(id.to_lowercase()) {
                return Err(UgmError::integrity(ID_ALIAS, id));
            }
            if let Some(login_attr) = login_attr {
                for login in find_values(&entry.attrs, login_attr).into_iter().flatten() {
                    if !seen_logins.insert(login.to_lowercase()) {
                        return Err(UgmError::integrity(LOGIN_ALIAS, login.clone()));
                    }
                }
            }
            index.ids_by_dn.insert(dn::normalize(&entry.dn)?, id.clone());
            index.dns.insert(id, entry.dn);
        }

        debug!(principal_type = %P::TYPE, count = index.dns.len(), "Loaded principal index");
        let index = Arc::new(index);
        self.state.write().index = Some(index.clone());
        Ok(index)
    }

    /// Sorted ids of all principals: directory entries minus staged
    /// deletions plus staged creations. Fails with `Integrity` if `id` or
    /// `login` values are not unique.
    pub async fn ids(&self) -> Result<Vec<String>> {
        let index = self.index().await?;
        let state = self.state.read();
        let mut ids: Vec<String> = index
            .dns
            .keys()
            .filter(|id| !state.deleted.contains_key(*id))
            .chain(state.storage.keys())
            .cloned()
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    pub async fn keys(&self) -> Result<Vec<String>> {
        self.ids().await
    }

    /// Id of the principal at `dn`. Case and whitespace differences in the
    /// DN are ignored.
    pub async fn idbydn(&self, dn: &str) -> Result<String> {
        let not_found = || UgmError::DnNotFound { dn: dn.to_string() };
        let normalized = dn::normalize(dn).map_err(|_| not_found())?;

        {
            let state = self.state.read();
            let cached = state.storage.iter().find(|(_, principal)| {
                dn::normalize(&principal.entry().dn()).is_ok_and(|candidate| candidate == normalized)
            });
            if let Some((id, _)) = cached {
                return Ok(id.clone());
            }
        }

        let index = self.index().await?;
        let state = self.state.read();
        match index.ids_by_dn.get(&normalized) {
            Some(id) if !state.deleted.contains_key(id) => Ok(id.clone()),
            _ => Err(not_found()),
        }
    }

    /// Whether `id` names a principal. Directory entries match without
    /// regard to case; staged creations match exactly.
    pub async fn contains(&self, id: &str) -> Result<bool> {
        if self.state.read().storage.contains_key(id) {
            return Ok(true);
        }
        let index = self.index().await?;
        let state = self.state.read();
        Ok(index
            .stored_id(id)
            .is_some_and(|stored| !state.deleted.contains_key(stored)))
    }

    /// The principal with `id`, from cache or resolved from the directory.
    pub async fn get(&self, id: &str) -> Result<Arc<P>> {
        {
            let state = self.state.read();
            if let Some(principal) = state.storage.get(id) {
                return Ok(principal.clone());
            }
            if state.deleted.contains_key(id) {
                return Err(UgmError::not_found(P::TYPE, id));
            }
        }

        let config = self.config();
        let filter = config.query_filter.clone() & Filter::eq(config.id_attr(), id);
        let mut entries = self.session().search_all(&self.base_request(filter)).await?;
        match entries.len() {
            0 => return Err(UgmError::not_found(P::TYPE, id)),
            1 => {}
            _ => return Err(UgmError::integrity(ID_ALIAS, id)),
        }

        let entry = entries.remove(0);
        let stored_id = self.entry_id(&entry.attrs).unwrap_or_else(|| id.to_string());
        debug!(principal_type = %P::TYPE, id = %stored_id, dn = %entry.dn, "Resolved principal");
        self.cache(stored_id, entry)
            .ok_or_else(|| UgmError::not_found(P::TYPE, id))
    }

    /// Cache a resolved entry under its stored id. `None` if that id is
    /// staged for deletion.
    fn cache(&self, id: String, entry: SearchEntry) -> Option<Arc<P>> {
        let mut state = self.state.write();
        if state.deleted.contains_key(&id) {
            return None;
        }
        if let Some(existing) = state.storage.get(&id) {
            return Some(existing.clone());
        }
        let node = DirectoryEntry::loaded(entry.dn, entry.attrs);
        let principal = Arc::new(P::from_entry(PrincipalEntry::new(id.clone(), node, self.context.clone())));
        state.storage.insert(id, principal.clone());
        Some(principal)
    }

    /// All principals, ordered by id.
    pub async fn values(&self) -> Result<Vec<Arc<P>>> {
        let mut principals = Vec::new();
        for id in self.ids().await? {
            principals.push(self.get(&id).await?);
        }
        Ok(principals)
    }

    /// Stage a new principal.
    ///
    /// `attrs` are keyed by alias. Caller supplied `id` and `rdn` values are
    /// ignored: the `id` argument always wins for the id attribute, and the
    /// rdn attribute is taken from whatever the other aliases and defaults
    /// produced. Defaults fill aliases the caller did not supply.
    pub async fn create<I, K, V>(&self, id: &str, attrs: I) -> Result<Arc<P>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: IntoAttributeValues,
    {
        if self.contains(id).await? {
            return Err(UgmError::AlreadyExists { id: id.to_string() });
        }

        let config = self.config();
        let mut built = Attributes::new();
        let mut supplied = HashSet::new();

        for (alias, values) in attrs {
            let alias = alias.into();
            let attr = config.attr(&alias)?;
            if alias == ID_ALIAS || alias == RDN_ALIAS {
                debug!(%alias, %id, "Ignoring naming alias supplied on create");
                continue;
            }
            put_values(&mut built, attr, values.into_values());
            supplied.insert(alias);
        }

        for (alias, default) in &config.defaults {
            if alias == ID_ALIAS || supplied.contains(alias) {
                continue;
            }
            let attr = config.attr(alias)?;
            if find_values(&built, attr).is_some() {
                continue;
            }
            put_values(&mut built, attr, default.resolve(self, id));
        }

        put_values(&mut built, config.id_attr(), vec![id.to_string()]);

        let rdn_value = find_values(&built, config.rdn_attr())
            .and_then(|values| values.first())
            .cloned()
            .ok_or_else(|| {
                UgmError::validation(format!(
                    "no value for rdn attribute '{}' of new {} '{}'",
                    config.rdn_attr(),
                    P::TYPE,
                    id
                ))
            })?;
        if !config.object_classes.is_empty() {
            put_values(&mut built, "objectClass", config.object_classes.clone());
        }

        let mut node = DirectoryEntry::new(dn::child(config.rdn_attr(), &rdn_value, &config.base_dn));
        for (name, values) in built {
            node.set(&name, values);
        }
        P::prepare(&mut node)?;

        let principal = Arc::new(P::from_entry(PrincipalEntry::new(id, node, self.context.clone())));
        self.state.write().storage.insert(id.to_string(), principal.clone());
        debug!(principal_type = %P::TYPE, %id, dn = %principal.entry().dn(), "Staged principal creation");
        Ok(principal)
    }

    /// `create` without attributes; only defaults apply.
    pub async fn create_with_defaults(&self, id: &str) -> Result<Arc<P>> {
        self.create(id, std::iter::empty::<(String, String)>()).await
    }

    /// Stage `principal` under `id`. Fails with `TypeMismatch` unless it is
    /// of this store's principal type.
    pub fn insert(&self, id: &str, principal: AnyPrincipal) -> Result<()> {
        let principal = P::from_any(principal).map_err(|_| UgmError::TypeMismatch { expected: P::TYPE })?;
        if principal.entry().id() != id {
            return Err(UgmError::validation(format!(
                "cannot store {} '{}' under id '{}'",
                P::TYPE,
                principal.entry().id(),
                id
            )));
        }
        self.state.write().storage.insert(id.to_string(), principal);
        Ok(())
    }

    /// Stage the deletion of `id`. For stores owned by a `Ugm` every group
    /// and role reference to the principal is removed as part of this call.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let principal = self.get(id).await?;
        let stored_id = principal.entry().id();
        if let Some(owner) = self.owner() {
            owner
                .release_references(P::TYPE, stored_id, &principal.entry().dn())
                .await?;
        }
        self.stage_delete(stored_id);
        Ok(())
    }

    /// Stage a deletion without touching references. `id` must be the
    /// stored id of the principal.
    pub(crate) fn stage_delete(&self, id: &str) {
        let mut state = self.state.write();
        let dn = match state.storage.shift_remove(id) {
            // never written, nothing to delete in the directory
            Some(principal) if principal.entry().is_new() => None,
            Some(principal) => Some(principal.entry().dn()),
            None => state.index.as_ref().and_then(|index| index.dns.get(id).cloned()),
        };
        if let Some(dn) = dn {
            debug!(principal_type = %P::TYPE, %id, %dn, "Staged principal deletion");
            state.deleted.insert(id.to_string(), dn);
        }
    }

    /// Write staged deletions, then staged creations and attribute edits,
    /// one directory operation each. Stops at the first failure; operations
    /// already applied stay applied.
    pub async fn persist(&self) -> Result<()> {
        let deletions: Vec<(String, String)> = self
            .state
            .read()
            .deleted
            .iter()
            .map(|(id, dn)| (id.clone(), dn.clone()))
            .collect();
        let pending: Vec<Arc<P>> = self
            .state
            .read()
            .storage
            .values()
            .filter(|principal| principal.entry().changed())
            .cloned()
            .collect();

        let mut structural = 0usize;
        let mut modified = 0usize;
        let result = self.flush(&deletions, &pending, &mut structural, &mut modified).await;

        if structural > 0 {
            self.state.write().index = None;
        }
        match &result {
            Ok(()) => info!(
                principal_type = %P::TYPE,
                deleted = deletions.len(),
                written = pending.len(),
                "Persisted principals"
            ),
            Err(err) => warn!(
                principal_type = %P::TYPE,
                error = %err,
                applied = structural + modified,
                "Persist stopped at first failure"
            ),
        }
        result
    }

    async fn flush(
        &self,
        deletions: &[(String, String)],
        pending: &[Arc<P>],
        structural: &mut usize,
        modified: &mut usize,
    ) -> Result<()> {
        for (id, dn) in deletions {
            self.session().delete(dn).await?;
            self.state.write().deleted.shift_remove(id);
            *structural += 1;
        }
        for principal in pending {
            let added = principal.entry().is_new();
            principal.entry().persist().await?;
            if added {
                *structural += 1;
            } else {
                *modified += 1;
            }
        }
        Ok(())
    }

    /// Drop one cached principal together with any change staged for it: a
    /// staged creation is discarded and a staged deletion is cancelled.
    /// Group and role references released by `delete` stay released.
    /// Unknown ids are ignored.
    pub fn invalidate(&self, id: &str) {
        let mut state = self.state.write();
        let cached = state.storage.shift_remove(id).is_some();
        let deletion = state.deleted.shift_remove(id).is_some();
        if cached || deletion {
            debug!(principal_type = %P::TYPE, %id, deletion, "Invalidated principal");
        }
    }

    /// Drop every cached principal, the id index and staged deletions.
    pub fn invalidate_all(&self) {
        let mut state = self.state.write();
        state.storage.clear();
        state.deleted.clear();
        state.index = None;
        debug!(principal_type = %P::TYPE, "Invalidated principal store");
    }

    /// Ids of matching principals, in directory order.
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<String>> {
        let results = self.run_search(query, &[]).await?;
        Ok(results.into_iter().map(|(id, _)| id).collect())
    }

    /// Matching principals with the values of the `attrlist` aliases.
    pub async fn search_attrs(&self, query: &SearchQuery, attrlist: &[&str]) -> Result<Vec<(String, AliasedValues)>> {
        self.run_search(query, attrlist).await
    }

    async fn run_search(&self, query: &SearchQuery, attrlist: &[&str]) -> Result<Vec<(String, AliasedValues)>> {
        let config = self.config();
        let wanted = attrlist
            .iter()
            .map(|alias| config.attr(alias).map(|attr| (*alias, attr)))
            .collect::<Result<Vec<(&str, &str)>>>()?;
        if query.is_exact() && query.is_empty() {
            return Err(UgmError::validation("exact match search requires criteria"));
        }

        let mut filter = config.query_filter.clone();
        if let Some(criteria) = query.to_filter(config)? {
            filter = filter & criteria;
        }
        let mut attributes = vec![config.id_attr().to_string()];
        attributes.extend(wanted.iter().map(|(_, attr)| attr.to_string()));
        let request = self
            .base_request(filter)
            .with_attributes(attributes)
            .with_page_size(config.page_size);

        let mut results = Vec::new();
        for entry in self.session().search_all(&request).await? {
            let Some(id) = self.entry_id(&entry.attrs) else {
                warn!(dn = %entry.dn, "Skipping search result without id attribute");
                continue;
            };
            let values: AliasedValues = wanted
                .iter()
                .filter_map(|(alias, attr)| find_values(&entry.attrs, attr).map(|v| (alias.to_string(), v.clone())))
                .collect();
            results.push((id, values));
        }

        if query.is_exact() && results.len() > 1 {
            return Err(UgmError::AmbiguousMatch);
        }
        Ok(results)
    }

    /// One page of ids and the cookie for the next page. An empty cookie
    /// means the result set is exhausted.
    pub async fn raw_search(&self, page_size: usize, cookie: &str) -> Result<(Vec<String>, String)> {
        let config = self.config();
        let request = self
            .base_request(config.query_filter.clone())
            .with_attributes([config.id_attr()])
            .with_page_size(Some(page_size))
            .with_cookie(Some(cookie.to_string()));
        let page = self.session().search(&request).await?;
        let ids = page
            .entries
            .iter()
            .filter_map(|entry| self.entry_id(&entry.attrs))
            .collect();
        Ok((ids, page.cookie.unwrap_or_default()))
    }
}

impl<P: PrincipalKind> PrincipalStore for Principals<P> {
    fn principal_type(&self) -> PrincipalType {
        P::TYPE
    }

    fn config(&self) -> &PrincipalsConfig {
        &self.context.config
    }

    fn cached_ids(&self) -> Vec<String> {
        self.state.read().storage.keys().cloned().collect()
    }

    fn changed(&self) -> bool {
        let state = self.state.read();
        !state.deleted.is_empty() || state.storage.values().any(|principal| principal.entry().changed())
    }
}

impl<P: PrincipalKind> fmt::Debug for Principals<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("Principals")
            .field("type", &P::TYPE)
            .field("base_dn", &self.context.config.base_dn)
            .field("cached", &state.storage.len())
            .field("deleted", &state.deleted.len())
            .finish()
    }
}
