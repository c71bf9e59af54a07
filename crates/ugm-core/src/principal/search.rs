//! Search criteria over aliased attributes

use indexmap::IndexMap;
use ugm_directory::{Filter, IntoAttributeValues};

use crate::principal::config::PrincipalsConfig;
use crate::shared::Result;

/// Criteria for `Principals::search`.
///
/// Each criterion maps an alias to one or more acceptable values. Without
/// `exact_match` values are matched as substrings and `*` matches any value.
/// Values of one criterion and the criteria themselves are combined with AND
/// unless `or_values` / `or_keys` say otherwise; both default to `or_search`.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    criteria: IndexMap<String, Vec<String>>,
    exact_match: bool,
    or_search: bool,
    or_keys: Option<bool>,
    or_values: Option<bool>,
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn criterion(mut self, alias: impl Into<String>, values: impl IntoAttributeValues) -> Self {
        self.criteria.insert(alias.into(), values.into_values());
        self
    }

    /// Equality matching; the search fails if more than one entry matches.
    pub fn exact_match(mut self, exact: bool) -> Self {
        self.exact_match = exact;
        self
    }

    pub fn or_search(mut self, or_search: bool) -> Self {
        self.or_search = or_search;
        self
    }

    pub fn or_keys(mut self, or_keys: bool) -> Self {
        self.or_keys = Some(or_keys);
        self
    }

    pub fn or_values(mut self, or_values: bool) -> Self {
        self.or_values = Some(or_values);
        self
    }

    pub fn is_exact(&self) -> bool {
        self.exact_match
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    /// Criteria as a filter over directory attributes, `None` without
    /// criteria. Fails on unmapped aliases.
    pub(crate) fn to_filter(&self, config: &PrincipalsConfig) -> Result<Option<Filter>> {
        let or_keys = self.or_keys.unwrap_or(self.or_search);
        let or_values = self.or_values.unwrap_or(self.or_search);

        let mut per_key = Vec::with_capacity(self.criteria.len());
        for (alias, values) in &self.criteria {
            let attr = config.attr(alias)?;
            let filters: Vec<Filter> = values
                .iter()
                .map(|value| {
                    if self.exact_match {
                        Filter::eq(attr, value.as_str())
                    } else if value == "*" {
                        Filter::present(attr)
                    } else {
                        Filter::contains(attr, value.as_str())
                    }
                })
                .collect();
            if filters.is_empty() {
                continue;
            }
            per_key.push(if or_values {
                Filter::any(filters)
            } else {
                Filter::all(filters)
            });
        }

        if per_key.is_empty() {
            return Ok(None);
        }
        Ok(Some(if or_keys {
            Filter::any(per_key)
        } else {
            Filter::all(per_key)
        }))
    }
}
