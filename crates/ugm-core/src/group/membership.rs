//! Membership encodings
//!
//! Groups and roles store their members in one multi-valued attribute whose
//! name and encoding follow from the entry's object class:
//!
//! | object class         | attribute      | encoding |
//! |----------------------|----------------|----------|
//! | `groupOfNames`       | `member`       | DN       |
//! | `groupOfUniqueNames` | `uniqueMember` | DN       |
//! | `posixGroup`         | `memberUid`    | bare id  |
//!
//! DN-encoded membership attributes may not be empty in most schemas, so an
//! empty member list is represented by a single placeholder DN.

use tracing::debug;
use ugm_directory::{dn, DirectoryEntry};

use crate::principal::PrincipalEntry;
use crate::shared::{Result, UgmError};

/// Stands in for "no members" in DN-encoded membership attributes.
pub const PLACEHOLDER_MEMBER: &str = "cn=nobody";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberFormat {
    /// Full distinguished names.
    Dn,
    /// Bare principal ids.
    Uid,
}

const MEMBER_TYPES: [(&str, &str, MemberFormat); 3] = [
    ("groupOfNames", "member", MemberFormat::Dn),
    ("groupOfUniqueNames", "uniqueMember", MemberFormat::Dn),
    ("posixGroup", "memberUid", MemberFormat::Uid),
];

fn lookup(object_class: &str) -> Option<(&'static str, MemberFormat)> {
    MEMBER_TYPES
        .iter()
        .find(|(class, _, _)| class.eq_ignore_ascii_case(object_class))
        .map(|(_, attribute, format)| (*attribute, *format))
}

pub fn member_format(object_class: &str) -> Result<MemberFormat> {
    lookup(object_class)
        .map(|(_, format)| format)
        .ok_or_else(|| UgmError::UnknownFormat {
            object_class: object_class.to_string(),
        })
}

pub fn member_attribute(object_class: &str) -> Result<&'static str> {
    lookup(object_class)
        .map(|(attribute, _)| attribute)
        .ok_or_else(|| UgmError::UnknownMemberAttribute {
            object_class: object_class.to_string(),
        })
}

/// Resolved membership attribute and encoding of one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Membership {
    pub format: MemberFormat,
    pub attribute: &'static str,
}

impl Membership {
    /// From the first known class in `object_classes`.
    pub fn for_object_classes<S: AsRef<str>>(object_classes: &[S]) -> Result<Self> {
        object_classes
            .iter()
            .find_map(|class| lookup(class.as_ref()))
            .map(|(attribute, format)| Membership { format, attribute })
            .ok_or_else(|| UgmError::UnknownFormat {
                object_class: object_classes
                    .iter()
                    .map(|class| class.as_ref())
                    .collect::<Vec<_>>()
                    .join(","),
            })
    }

    pub fn of_node(node: &DirectoryEntry) -> Result<Self> {
        let classes = node.get("objectClass").cloned().unwrap_or_default();
        Self::for_object_classes(&classes)
    }

    pub(crate) fn of(entry: &PrincipalEntry) -> Result<Self> {
        entry.read(Self::of_node)
    }

    fn is_placeholder(&self, value: &str) -> bool {
        self.format == MemberFormat::Dn && dn::eq(value, PLACEHOLDER_MEMBER)
    }

    fn same(&self, left: &str, right: &str) -> bool {
        match self.format {
            MemberFormat::Dn => dn::eq(left, right),
            MemberFormat::Uid => left == right,
        }
    }

    /// Stored references in attribute order, placeholder excluded.
    pub fn references(&self, node: &DirectoryEntry) -> Vec<String> {
        node.get(self.attribute)
            .into_iter()
            .flatten()
            .filter(|value| !self.is_placeholder(value))
            .cloned()
            .collect()
    }

    pub fn has_reference(&self, node: &DirectoryEntry, reference: &str) -> bool {
        self.references(node).iter().any(|value| self.same(value, reference))
    }

    /// Append `reference`, dropping the placeholder. Returns false if it
    /// was already present.
    pub fn add_reference(&self, node: &mut DirectoryEntry, reference: &str) -> bool {
        let mut values = self.references(node);
        if values.iter().any(|value| self.same(value, reference)) {
            return false;
        }
        values.push(reference.to_string());
        node.set(self.attribute, values);
        true
    }

    /// Remove `reference`. The placeholder is restored when a DN list
    /// becomes empty. Returns false if it was not present.
    pub fn remove_reference(&self, node: &mut DirectoryEntry, reference: &str) -> bool {
        let mut values = self.references(node);
        let before = values.len();
        values.retain(|value| !self.same(value, reference));
        if values.len() == before {
            return false;
        }
        if values.is_empty() && self.format == MemberFormat::Dn {
            values.push(PLACEHOLDER_MEMBER.to_string());
        }
        node.set(self.attribute, values);
        true
    }
}

/// Seed new DN-encoded entries with the placeholder. Entries without a known
/// membership class are left alone.
pub(crate) fn prepare_members(node: &mut DirectoryEntry) -> Result<()> {
    if let Ok(membership) = Membership::of_node(node) {
        if membership.format == MemberFormat::Dn && node.get(membership.attribute).is_none() {
            node.set(membership.attribute, PLACEHOLDER_MEMBER);
        }
    }
    Ok(())
}

/// Stage `reference` on `entry`; `MemberExists` if it is already there.
pub(crate) fn add_member(entry: &PrincipalEntry, key: &str, reference: &str) -> Result<()> {
    let membership = Membership::of(entry)?;
    if !entry.write(|node| membership.add_reference(node, reference)) {
        return Err(UgmError::MemberExists { member: key.to_string() });
    }
    debug!(principal = %entry.id(), member = %key, "Staged member addition");
    Ok(())
}

/// Stage removal of `reference`; `MemberNotFound` if it is absent.
pub(crate) fn remove_member(entry: &PrincipalEntry, key: &str, reference: &str) -> Result<()> {
    let membership = Membership::of(entry)?;
    if !entry.write(|node| membership.remove_reference(node, reference)) {
        return Err(UgmError::member_not_found(key));
    }
    debug!(principal = %entry.id(), member = %key, "Staged member removal");
    Ok(())
}
