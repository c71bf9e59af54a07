//! LDAP search filters (RFC 4515)
//!
//! `Filter` wraps the `ldap3_proto` filter tree. Parsing goes through the
//! `ldap3_proto` filter grammar; rendering escapes assertion values with
//! `ldap3::ldap_escape`. Evaluation against an attribute map compares names
//! and values without regard to case, which matches the default matching
//! rules of the attributes UGM works with (`cn`, `sn`, `uid`, `member`, ...).
//!
//! Only equality, presence, substring and the boolean combinators are
//! supported; other filter items are rejected by `Filter::parse`.

use std::fmt;
use std::ops::{BitAnd, BitOr, Not};
use std::str::FromStr;

use ldap3::ldap_escape;
use ldap3_proto::filter::parse_ldap_filter_str;
use ldap3_proto::proto::{LdapFilter, LdapSubstringFilter};

use crate::entry::{find_values, Attributes};
use crate::error::{DirectoryError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Filter(LdapFilter);

impl Filter {
    pub fn eq(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Filter(LdapFilter::Equality(attribute.into(), value.into()))
    }

    pub fn present(attribute: impl Into<String>) -> Self {
        Filter(LdapFilter::Present(attribute.into()))
    }

    /// `(attribute=*value*)`
    pub fn contains(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Filter(LdapFilter::Substring(
            attribute.into(),
            LdapSubstringFilter {
                initial: None,
                any: vec![value.into()],
                final_: None,
            },
        ))
    }

    /// Matches every entry.
    pub fn everything() -> Self {
        Filter::present("objectClass")
    }

    /// Conjunction of `filters`; a single filter is returned as is.
    pub fn all(mut filters: Vec<Filter>) -> Self {
        if filters.len() == 1 {
            return filters.remove(0);
        }
        Filter(LdapFilter::And(filters.into_iter().map(|f| f.0).collect()))
    }

    /// Disjunction of `filters`; a single filter is returned as is.
    pub fn any(mut filters: Vec<Filter>) -> Self {
        if filters.len() == 1 {
            return filters.remove(0);
        }
        Filter(LdapFilter::Or(filters.into_iter().map(|f| f.0).collect()))
    }

    pub fn and(self, other: Filter) -> Self {
        match self.0 {
            LdapFilter::And(mut filters) => {
                filters.push(other.0);
                Filter(LdapFilter::And(filters))
            }
            filter => Filter(LdapFilter::And(vec![filter, other.0])),
        }
    }

    pub fn or(self, other: Filter) -> Self {
        match self.0 {
            LdapFilter::Or(mut filters) => {
                filters.push(other.0);
                Filter(LdapFilter::Or(filters))
            }
            filter => Filter(LdapFilter::Or(vec![filter, other.0])),
        }
    }

    /// Parse the string form. A bare `attr=value` is read as `(attr=value)`.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(DirectoryError::invalid_filter(input, "empty filter"));
        }
        let source = if trimmed.starts_with('(') {
            trimmed.to_string()
        } else {
            format!("({trimmed})")
        };

        let filter = parse_ldap_filter_str(&source)
            .map_err(|err| DirectoryError::invalid_filter(input, err.to_string()))?;
        if let Some(item) = unsupported(&filter) {
            return Err(DirectoryError::invalid_filter(input, format!("unsupported filter item {item}")));
        }
        Ok(Filter(filter))
    }

    pub fn as_ldap(&self) -> &LdapFilter {
        &self.0
    }

    /// Evaluate the filter against an entry's attributes.
    pub fn matches(&self, attrs: &Attributes) -> bool {
        evaluate(&self.0, attrs)
    }
}

impl From<Filter> for LdapFilter {
    fn from(filter: Filter) -> Self {
        filter.0
    }
}

/// First filter item the memory evaluator and renderer cannot handle.
fn unsupported(filter: &LdapFilter) -> Option<String> {
    match filter {
        LdapFilter::And(filters) | LdapFilter::Or(filters) => filters.iter().find_map(unsupported),
        LdapFilter::Not(filter) => unsupported(filter),
        LdapFilter::Equality(..) | LdapFilter::Present(_) | LdapFilter::Substring(..) => None,
        other => Some(format!("{other:?}")),
    }
}

fn evaluate(filter: &LdapFilter, attrs: &Attributes) -> bool {
    match filter {
        LdapFilter::And(filters) => filters.iter().all(|f| evaluate(f, attrs)),
        LdapFilter::Or(filters) => filters.iter().any(|f| evaluate(f, attrs)),
        LdapFilter::Not(filter) => !evaluate(filter, attrs),
        LdapFilter::Present(attribute) => find_values(attrs, attribute).is_some_and(|values| !values.is_empty()),
        LdapFilter::Equality(attribute, expected) => {
            let expected = expected.to_lowercase();
            find_values(attrs, attribute).is_some_and(|values| values.iter().any(|v| v.to_lowercase() == expected))
        }
        LdapFilter::Substring(attribute, substring) => find_values(attrs, attribute)
            .is_some_and(|values| values.iter().any(|v| substring_matches(&v.to_lowercase(), substring))),
        _ => false,
    }
}

fn substring_matches(value: &str, substring: &LdapSubstringFilter) -> bool {
    let mut rest = value;

    if let Some(initial) = &substring.initial {
        match rest.strip_prefix(initial.to_lowercase().as_str()) {
            Some(tail) => rest = tail,
            None => return false,
        }
    }

    for part in &substring.any {
        let part = part.to_lowercase();
        match rest.find(part.as_str()) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }

    match &substring.final_ {
        Some(last) => rest.ends_with(last.to_lowercase().as_str()),
        None => true,
    }
}

fn render(filter: &LdapFilter, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match filter {
        LdapFilter::And(filters) => {
            f.write_str("(&")?;
            for filter in filters {
                render(filter, f)?;
            }
            f.write_str(")")
        }
        LdapFilter::Or(filters) => {
            f.write_str("(|")?;
            for filter in filters {
                render(filter, f)?;
            }
            f.write_str(")")
        }
        LdapFilter::Not(filter) => {
            f.write_str("(!")?;
            render(filter, f)?;
            f.write_str(")")
        }
        LdapFilter::Equality(attribute, value) => write!(f, "({}={})", attribute, ldap_escape(value.as_str())),
        LdapFilter::Present(attribute) => write!(f, "({attribute}=*)"),
        LdapFilter::Substring(attribute, substring) => {
            write!(f, "({attribute}=")?;
            if let Some(initial) = &substring.initial {
                write!(f, "{}", ldap_escape(initial.as_str()))?;
            }
            for part in &substring.any {
                write!(f, "*{}", ldap_escape(part.as_str()))?;
            }
            f.write_str("*")?;
            if let Some(last) = &substring.final_ {
                write!(f, "{}", ldap_escape(last.as_str()))?;
            }
            f.write_str(")")
        }
        // rejected by `Filter::parse` and never built by the constructors
        _ => Ok(()),
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        render(&self.0, f)
    }
}

impl FromStr for Filter {
    type Err = DirectoryError;

    fn from_str(s: &str) -> Result<Self> {
        Filter::parse(s)
    }
}

impl BitAnd for Filter {
    type Output = Filter;

    fn bitand(self, rhs: Filter) -> Filter {
        self.and(rhs)
    }
}

impl BitOr for Filter {
    type Output = Filter;

    fn bitor(self, rhs: Filter) -> Filter {
        self.or(rhs)
    }
}

impl Not for Filter {
    type Output = Filter;

    fn not(self) -> Filter {
        Filter(LdapFilter::Not(Box::new(self.0)))
    }
}
