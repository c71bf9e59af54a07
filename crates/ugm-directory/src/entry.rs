//! Dirty-tracking directory entry node
//!
//! A `DirectoryEntry` holds the attributes of one entry together with the
//! snapshot taken when it was last loaded or written. The difference between
//! the two is what a persist has to send to the directory.

use indexmap::IndexMap;

use crate::session::Modification;

/// Multi-valued attributes in directory order.
pub type Attributes = IndexMap<String, Vec<String>>;

/// Case-insensitive attribute lookup.
pub fn find_values<'a>(attrs: &'a Attributes, name: &str) -> Option<&'a Vec<String>> {
    attrs
        .get(name)
        .or_else(|| attrs.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v))
}

fn find_key(attrs: &Attributes, name: &str) -> Option<String> {
    attrs.keys().find(|k| k.eq_ignore_ascii_case(name)).cloned()
}

/// Replace or insert `name`, keeping the stored spelling of the key. An empty
/// value list removes the attribute.
pub fn put_values(attrs: &mut Attributes, name: &str, values: Vec<String>) {
    let key = find_key(attrs, name);
    if values.is_empty() {
        if let Some(key) = key {
            attrs.shift_remove(&key);
        }
        return;
    }
    match key {
        Some(key) => {
            attrs.insert(key, values);
        }
        None => {
            attrs.insert(name.to_string(), values);
        }
    }
}

pub fn remove_values(attrs: &mut Attributes, name: &str) -> Option<Vec<String>> {
    let key = find_key(attrs, name)?;
    attrs.shift_remove(&key)
}

/// Apply modifications in order.
pub fn apply_modifications(attrs: &mut Attributes, changes: &[Modification]) {
    for change in changes {
        match change {
            Modification::Replace(name, values) => put_values(attrs, name, values.clone()),
            Modification::Delete(name) => {
                remove_values(attrs, name);
            }
        }
    }
}

/// Conversion into a multi-valued attribute value.
pub trait IntoAttributeValues {
    fn into_values(self) -> Vec<String>;
}

impl IntoAttributeValues for &str {
    fn into_values(self) -> Vec<String> {
        vec![self.to_string()]
    }
}

impl IntoAttributeValues for String {
    fn into_values(self) -> Vec<String> {
        vec![self]
    }
}

impl IntoAttributeValues for &String {
    fn into_values(self) -> Vec<String> {
        vec![self.clone()]
    }
}

impl IntoAttributeValues for Vec<String> {
    fn into_values(self) -> Vec<String> {
        self
    }
}

impl IntoAttributeValues for Vec<&str> {
    fn into_values(self) -> Vec<String> {
        self.into_iter().map(str::to_string).collect()
    }
}

impl IntoAttributeValues for &[&str] {
    fn into_values(self) -> Vec<String> {
        self.iter().map(|s| s.to_string()).collect()
    }
}

impl<const N: usize> IntoAttributeValues for [&str; N] {
    fn into_values(self) -> Vec<String> {
        self.iter().map(|s| s.to_string()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Not yet in the directory; persisting adds it.
    New,
    /// Mirrors a directory entry; persisting sends the modifications.
    Loaded,
}

#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    dn: String,
    attrs: Attributes,
    snapshot: Attributes,
    state: EntryState,
}

impl DirectoryEntry {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attrs: Attributes::new(),
            snapshot: Attributes::new(),
            state: EntryState::New,
        }
    }

    pub fn loaded(dn: impl Into<String>, attrs: Attributes) -> Self {
        Self {
            dn: dn.into(),
            snapshot: attrs.clone(),
            attrs,
            state: EntryState::Loaded,
        }
    }

    pub fn dn(&self) -> &str {
        &self.dn
    }

    pub fn state(&self) -> EntryState {
        self.state
    }

    pub fn is_new(&self) -> bool {
        self.state == EntryState::New
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attrs
    }

    pub fn get(&self, name: &str) -> Option<&Vec<String>> {
        find_values(&self.attrs, name)
    }

    pub fn first(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|values| values.first()).map(String::as_str)
    }

    pub fn set(&mut self, name: &str, values: impl IntoAttributeValues) {
        put_values(&mut self.attrs, name, values.into_values());
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        remove_values(&mut self.attrs, name)
    }

    /// Changes needed to bring the directory copy in line with this entry.
    /// Empty for new entries, which are added as a whole.
    pub fn modifications(&self) -> Vec<Modification> {
        if self.is_new() {
            return Vec::new();
        }

        let mut changes = Vec::new();
        for (name, values) in &self.attrs {
            if find_values(&self.snapshot, name) != Some(values) {
                changes.push(Modification::Replace(name.clone(), values.clone()));
            }
        }
        for name in self.snapshot.keys() {
            if find_values(&self.attrs, name).is_none() {
                changes.push(Modification::Delete(name.clone()));
            }
        }
        changes
    }

    pub fn changed(&self) -> bool {
        self.is_new() || !self.modifications().is_empty()
    }

    /// Record that `written` is now what the directory holds.
    pub fn commit(&mut self, written: Attributes) {
        self.snapshot = written;
        self.state = EntryState::Loaded;
    }

    /// Discard local edits and take `attrs` as the loaded state.
    pub fn reset(&mut self, attrs: Attributes) {
        self.snapshot = attrs.clone();
        self.attrs = attrs;
        self.state = EntryState::Loaded;
    }

    /// Update an attribute on both sides, leaving the dirty state untouched.
    pub fn refresh(&mut self, name: &str, values: Vec<String>) {
        put_values(&mut self.attrs, name, values.clone());
        put_values(&mut self.snapshot, name, values);
    }
}
