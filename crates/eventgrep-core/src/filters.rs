//! Include/exclude filter sets
//!
//! Every dimension is filtered the same way, so a single [`FilterSet`] type is
//! evaluated once per dimension.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::types::{Dimension, Message};
use crate::{Error, Result};

/// Maximum number of values in one include or exclude list
pub const MAX_FILTER_VALUES: usize = 100;

/// Maximum length of a single filter value
pub const MAX_VALUE_LEN: usize = 256;

/// Positive and negative constraint for one dimension.
///
/// An empty `include` matches everything. `exclude` is applied after
/// `include` and always wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSet {
    #[serde(default)]
    pub include: BTreeSet<String>,
    #[serde(default)]
    pub exclude: BTreeSet<String>,
}

impl FilterSet {
    pub fn new<I, E, S, T>(include: I, exclude: E) -> Self
    where
        I: IntoIterator<Item = S>,
        E: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            include: include.into_iter().map(Into::into).collect(),
            exclude: exclude.into_iter().map(Into::into).collect(),
        }
    }

    /// Normalize raw include and exclude parameter lists.
    pub fn parse(dimension: Dimension, include: &[String], exclude: &[String]) -> Result<Self> {
        Ok(Self {
            include: normalize_values(dimension.as_str(), include)?,
            exclude: normalize_values(&format!("not_{}", dimension), exclude)?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    /// Evaluate against the values a message carries for this dimension.
    pub fn matches<S: AsRef<str>>(&self, values: &[S]) -> bool {
        let included = self.include.is_empty()
            || values.iter().any(|v| self.include.contains(v.as_ref()));
        let excluded = values.iter().any(|v| self.exclude.contains(v.as_ref()));
        included && !excluded
    }

    /// The same set with `include` narrowed to one value, keeping exclusions.
    pub fn narrowed_to(&self, value: &str) -> Self {
        Self {
            include: BTreeSet::from([value.to_string()]),
            exclude: self.exclude.clone(),
        }
    }
}

/// Filter sets for all four dimensions, AND-ed together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filters {
    #[serde(default)]
    pub users: FilterSet,
    #[serde(default)]
    pub packages: FilterSet,
    #[serde(default)]
    pub categories: FilterSet,
    #[serde(default)]
    pub topics: FilterSet,
}

impl Filters {
    pub fn get(&self, dimension: Dimension) -> &FilterSet {
        match dimension {
            Dimension::User => &self.users,
            Dimension::Package => &self.packages,
            Dimension::Category => &self.categories,
            Dimension::Topic => &self.topics,
        }
    }

    pub fn get_mut(&mut self, dimension: Dimension) -> &mut FilterSet {
        match dimension {
            Dimension::User => &mut self.users,
            Dimension::Package => &mut self.packages,
            Dimension::Category => &mut self.categories,
            Dimension::Topic => &mut self.topics,
        }
    }

    /// Iterate `(dimension, set)` for every dimension that constrains anything.
    pub fn active(&self) -> impl Iterator<Item = (Dimension, &FilterSet)> {
        Dimension::ALL
            .into_iter()
            .map(|d| (d, self.get(d)))
            .filter(|(_, set)| !set.is_empty())
    }

    pub fn matches(&self, message: &Message) -> bool {
        Dimension::ALL
            .into_iter()
            .all(|d| self.get(d).matches(message.values(d)))
    }
}

/// Split comma-separated and repeated parameters into a deduplicated set.
///
/// An empty list is "no constraint". An explicitly supplied token that is
/// empty after trimming is rejected rather than silently matching everything.
pub fn normalize_values(name: &str, raw: &[String]) -> Result<BTreeSet<String>> {
    let mut values = BTreeSet::new();

    for param in raw {
        for token in param.split(',') {
            let token = token.trim();
            if token.is_empty() {
                return Err(Error::invalid(format!(
                    "{} contains an empty value",
                    name
                )));
            }
            if token.len() > MAX_VALUE_LEN {
                return Err(Error::invalid(format!(
                    "{} value exceeds maximum length of {}",
                    name, MAX_VALUE_LEN
                )));
            }
            values.insert(token.to_string());
        }
    }

    if values.len() > MAX_FILTER_VALUES {
        return Err(Error::invalid(format!(
            "{} exceeds maximum of {} values",
            name, MAX_FILTER_VALUES
        )));
    }

    Ok(values)
}

/// Normalize free-text search terms. Commas are part of the text, not separators.
pub fn normalize_terms(raw: &[String]) -> Result<BTreeSet<String>> {
    let mut terms = BTreeSet::new();
    for term in raw {
        let term = term.trim();
        if term.is_empty() {
            return Err(Error::invalid("contains must not be empty"));
        }
        if term.len() > MAX_VALUE_LEN {
            return Err(Error::invalid(format!(
                "contains exceeds maximum length of {}",
                MAX_VALUE_LEN
            )));
        }
        terms.insert(term.to_string());
    }
    Ok(terms)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize_splits_trims_and_dedups() {
        let values =
            normalize_values("user", &strings(&["alice, bob", "carol", "alice"])).unwrap();
        assert_eq!(
            values.into_iter().collect::<Vec<_>>(),
            vec!["alice", "bob", "carol"]
        );
    }

    #[test]
    fn test_normalize_empty_list_is_no_constraint() {
        assert!(normalize_values("user", &[]).unwrap().is_empty());
    }

    #[test]
    fn test_normalize_rejects_explicit_empty_tokens() {
        for raw in [vec![""], vec!["   "], vec!["alice,,bob"], vec!["alice,"]] {
            let err = normalize_values("user", &strings(&raw)).unwrap_err();
            assert!(err.is_invalid_parameter());
            assert!(err.to_string().contains("user"));
        }
    }

    #[test]
    fn test_normalize_limits() {
        let many: Vec<String> = (0..=MAX_FILTER_VALUES).map(|i| format!("u{i}")).collect();
        assert!(normalize_values("user", &many).is_err());
        assert!(normalize_values("user", &["a".repeat(MAX_VALUE_LEN + 1)]).is_err());
    }

    #[test]
    fn test_parse_labels_exclusions() {
        let err = FilterSet::parse(Dimension::Topic, &[], &strings(&[" "])).unwrap_err();
        assert!(err.to_string().contains("not_topic"));
    }

    #[test]
    fn test_empty_set_matches_everything() {
        let set = FilterSet::default();
        assert!(set.matches(&["anything"]));
        assert!(set.matches::<&str>(&[]));
    }

    #[test]
    fn test_include_is_any_of() {
        let set = FilterSet::new(["alice", "bob"], Vec::<String>::new());
        assert!(set.matches(&["carol", "bob"]));
        assert!(!set.matches(&["carol"]));
        assert!(!set.matches::<&str>(&[]));
    }

    #[test]
    fn test_exclude_wins_over_include() {
        let set = FilterSet::new(["alice"], ["alice"]);
        assert!(!set.matches(&["alice"]));

        let set = FilterSet::new(["alice"], ["mallory"]);
        assert!(!set.matches(&["alice", "mallory"]));
        assert!(set.matches(&["alice"]));
    }

    #[test]
    fn test_narrowed_keeps_exclusions() {
        let set = FilterSet::new(["a", "b"], ["c"]);
        let narrowed = set.narrowed_to("a");
        assert_eq!(narrowed.include.len(), 1);
        assert!(narrowed.exclude.contains("c"));
    }

    #[test]
    fn test_normalize_terms_keeps_commas() {
        let terms = normalize_terms(&strings(&[" foo, bar "])).unwrap();
        assert!(terms.contains("foo, bar"));
        assert!(normalize_terms(&strings(&[""])).is_err());
    }
}
